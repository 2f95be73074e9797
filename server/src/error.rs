//! Error types for the trivia server library.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::game::Phase;

/// Faults that abort the process before any match begins.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Questions(#[from] QuestionError),
    #[error("invalid configuration: {0}")]
    Config(String),
}

#[derive(Debug, Error)]
pub enum QuestionError {
    #[error("failed to read question file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse question file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("question file contains no questions")]
    Empty,
    #[error("question {index} is invalid: {reason}")]
    Invalid { index: usize, reason: String },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("no participants are registered")]
    EmptyLobby,
    #[error("no rounds to play")]
    NoRounds,
    #[error("a match can only start from the lobby (currently {0:?})")]
    NotInLobby(Phase),
}
