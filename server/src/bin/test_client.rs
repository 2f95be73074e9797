use clap::Parser;
use log::{debug, info, warn};
use rand::seq::SliceRandom;
use rand::Rng;
use shared::{designator, ClientMessage, ServerMessage};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::sleep;

/// Scripted player for exercising a running trivia server.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:8080")]
    server: String,

    /// Display name to register with
    #[arg(short, long, default_value = "bot")]
    name: String,

    /// Always answer with this designator instead of guessing
    #[arg(short, long)]
    answer: Option<String>,

    /// Longest think time before answering, in milliseconds
    #[arg(long, default_value = "3000")]
    max_delay_ms: u64,

    /// Keep listening after a match ends
    #[arg(long)]
    stay: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let stream = TcpStream::connect(&args.server).await?;
    info!("Connected to {}", args.server);

    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();

    while let Some(line) = lines.next_line().await? {
        let message = match ServerMessage::decode(&line) {
            Ok(message) => message,
            Err(e) => {
                warn!("Unreadable line from server: {}", e);
                continue;
            }
        };

        match message {
            ServerMessage::NameRequest => {
                write_half
                    .write_all(format!("{}\n", args.name).as_bytes())
                    .await?;
                info!("Joined as {}", args.name);
            }
            ServerMessage::ServerFull => {
                println!("Server is full");
                break;
            }
            ServerMessage::MatchStart => println!("Match starting!"),
            ServerMessage::Countdown { value } => println!("{}...", value),
            ServerMessage::Question {
                round,
                total,
                text,
                options,
                ..
            } => {
                println!("\nQuestion {}/{}: {}", round, total, text);
                for option in &options {
                    println!("  {}", option);
                }

                let choice = match &args.answer {
                    Some(fixed) => fixed.clone(),
                    None => options
                        .choose(&mut rand::thread_rng())
                        .map(|option| designator(option).to_string())
                        .unwrap_or_default(),
                };
                let delay = rand::thread_rng().gen_range(0..=args.max_delay_ms);
                sleep(Duration::from_millis(delay)).await;

                let answer = ClientMessage::answer(round, choice.clone()).encode()?;
                write_half.write_all(answer.as_bytes()).await?;
                println!("Answered {} after {}ms", choice, delay);
            }
            ServerMessage::AnswerResult { correct } => {
                println!("{}", if correct { "Correct!" } else { "Wrong." });
            }
            ServerMessage::Scoreboard { scores, is_final } => {
                let title = if is_final { "FINAL SCORES" } else { "SCOREBOARD" };
                println!("\n--- {} ---", title);
                for (place, entry) in scores.iter().enumerate() {
                    println!("{}. {} - {} points", place + 1, entry.name, entry.score);
                }
            }
            ServerMessage::GameOver { scores } => {
                if let Some(winner) = scores.first() {
                    println!("Game over! {} wins with {} points", winner.name, winner.score);
                }
                if !args.stay {
                    break;
                }
            }
            ServerMessage::Unknown => debug!("Ignoring unknown message"),
        }
    }

    Ok(())
}
