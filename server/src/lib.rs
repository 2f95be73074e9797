//! # Trivia Server Library
//!
//! This library runs live multiplayer trivia matches. Players connect over TCP,
//! receive every question at the same moment, answer against a shared deadline,
//! and are scored by how fast they answered correctly.
//!
//! ## Core Responsibilities
//!
//! ### Participant Tracking
//! The [`registry::ConnectionRegistry`] is the single owner of the live player
//! set. Registration, removal, snapshots, score updates and broadcasts all go
//! through it under one lock.
//!
//! ### Deadline-Bounded Collection
//! The [`collector::AnswerCollector`] reads from every player concurrently with
//! short bounded attempts against one absolute deadline. Silent, slow or
//! disconnected players never hold a round open.
//!
//! ### Scoring
//! [`scoring::score`] is a pure function: the fastest correct answer earns 100
//! points and each following correct answer earns half of the previous award.
//!
//! ### Match Orchestration
//! The [`game::GameSession`] state machine sequences lobby, countdown, rounds,
//! scoreboards and the final results.
//!
//! ## Wire Protocol
//!
//! Newline-delimited JSON in both directions, with a `type` discriminator. The
//! message types live in the `shared` crate. A new connection is asked for its
//! name, and the first line it sends back is taken as the display name.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::SessionConfig;
//! use server::game::GameSession;
//! use server::network::Server;
//! use server::questions::QuestionBank;
//! use server::registry::ConnectionRegistry;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let bank = QuestionBank::load("questions.json")?;
//!     let registry = Arc::new(ConnectionRegistry::new(8));
//!
//!     let server = Server::bind("0.0.0.0:8080", Arc::clone(&registry), Duration::from_secs(60)).await?;
//!     tokio::spawn(server.run());
//!
//!     // Give players a moment to join, then play one match.
//!     tokio::time::sleep(Duration::from_secs(30)).await;
//!     let mut session = GameSession::new(registry, SessionConfig::default());
//!     let standings = session.run_match(bank.draw(10)).await?;
//!     println!("{:?}", standings);
//!     Ok(())
//! }
//! ```
//!
//! ## Failure Handling
//!
//! A read timeout is retried until the round deadline. Any other read failure
//! removes the player from the registry. Malformed lines are dropped and the
//! player can still answer. Write failures during a broadcast are skipped for
//! that player only.

pub mod client;
pub mod collector;
pub mod config;
pub mod error;
pub mod game;
pub mod network;
pub mod questions;
pub mod registry;
pub mod scoring;
pub mod utils;
