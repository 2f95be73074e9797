use clap::Parser;
use log::{info, warn};
use server::config::{MatchMode, ServerConfig, SessionConfig};
use server::error::{ServerError, SessionError};
use server::game::GameSession;
use server::network::Server;
use server::questions::QuestionBank;
use server::registry::ConnectionRegistry;
use server::utils::local_ip;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "0.0.0.0")]
    host: String,

    /// Server port to listen on
    #[arg(short, long, default_value_t = shared::DEFAULT_PORT)]
    port: u16,

    /// JSON question file
    #[arg(short, long, default_value = "questions.json")]
    questions: PathBuf,

    /// Maximum number of rounds per match
    #[arg(short = 'r', long, default_value = "10")]
    max_rounds: usize,

    /// Maximum number of connected players
    #[arg(short = 'm', long, default_value = "8")]
    max_players: usize,

    /// Seconds players have to answer each question
    #[arg(long, default_value_t = shared::ROUND_WINDOW_SECS)]
    round_secs: u64,

    /// Seconds between a scoreboard and the next question
    #[arg(long, default_value_t = shared::INTER_ROUND_DELAY_SECS)]
    pause_secs: u64,

    /// Play one match and exit, or keep hosting matches
    #[arg(long, value_enum, default_value = "single")]
    mode: MatchMode,

    /// Start automatically once this many players have joined
    #[arg(short, long)]
    auto_start: Option<usize>,

    /// Do not tell players whether their answer was correct right away
    #[arg(long)]
    no_feedback: bool,
}

impl Args {
    fn config(&self) -> ServerConfig {
        ServerConfig {
            max_players: self.max_players,
            max_rounds: self.max_rounds,
            mode: self.mode,
            auto_start: self.auto_start,
            session: SessionConfig {
                round_window: Duration::from_secs(self.round_secs),
                inter_round_delay: Duration::from_secs(self.pause_secs),
                immediate_feedback: !self.no_feedback,
                ..SessionConfig::default()
            },
            ..ServerConfig::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    let config = args.config();

    let registry = Arc::new(
        ConnectionRegistry::new(config.max_players).with_write_timeout(config.write_timeout),
    );
    let (bank, server) = prepare(&args, &config, Arc::clone(&registry)).await?;

    println!(
        "Players can connect to {}:{} ({} questions loaded)",
        local_ip(),
        args.port,
        bank.len()
    );
    tokio::spawn(server.run());

    let mut session = GameSession::new(Arc::clone(&registry), config.session.clone())
        .with_write_timeout(config.write_timeout);
    let mut operator = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let started = tokio::select! {
            started = wait_for_start(&mut operator, &registry, config.auto_start) => started,
            _ = tokio::signal::ctrl_c() => {
                println!("Received Ctrl+C, shutting down...");
                break;
            }
        };
        if !started {
            info!("Operator input closed, shutting down");
            break;
        }

        let result = tokio::select! {
            result = session.run_match(bank.draw(config.max_rounds)) => result,
            _ = tokio::signal::ctrl_c() => {
                println!("Received Ctrl+C, shutting down...");
                break;
            }
        };

        match result {
            Ok(standings) => {
                if let Some(winner) = standings.first() {
                    println!("Winner: {} with {} points", winner.name, winner.score);
                }
            }
            Err(SessionError::EmptyLobby) if config.mode == MatchMode::Continuous => {
                warn!("No players connected yet");
                tokio::time::sleep(Duration::from_secs(1)).await;
                continue;
            }
            Err(e) => return Err(e.into()),
        }

        if config.mode == MatchMode::Single {
            break;
        }
        session.reset().await;
    }

    Ok(())
}

/// Startup checks that abort the process before any match.
async fn prepare(
    args: &Args,
    config: &ServerConfig,
    registry: Arc<ConnectionRegistry>,
) -> Result<(QuestionBank, Server), ServerError> {
    config.validate()?;
    let bank = QuestionBank::load(&args.questions)?;
    let address = format!("{}:{}", args.host, args.port);
    let server = Server::bind(&address, registry, config.handshake_timeout).await?;
    Ok((bank, server))
}

/// Waits for the operator to press Enter, or for enough players to join.
///
/// Returns false once stdin is closed and there is no auto-start threshold.
async fn wait_for_start(
    operator: &mut Lines<BufReader<Stdin>>,
    registry: &ConnectionRegistry,
    auto_start: Option<usize>,
) -> bool {
    match auto_start {
        Some(threshold) => {
            println!("Waiting for {} players...", threshold);
            while registry.len().await < threshold {
                tokio::time::sleep(Duration::from_millis(500)).await;
            }
            true
        }
        None => {
            println!(
                "Press Enter to start the match ({} connected)",
                registry.len().await
            );
            matches!(operator.next_line().await, Ok(Some(_)))
        }
    }
}
