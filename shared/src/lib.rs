use serde::{Deserialize, Serialize};

pub const DEFAULT_PORT: u16 = 8080;
pub const ROUND_WINDOW_SECS: u64 = 10;
pub const INTER_ROUND_DELAY_SECS: u64 = 5;
pub const COUNTDOWN_FROM: u32 = 3;
pub const FIRST_PLACE_POINTS: u32 = 100;

/// Messages written by the server, one JSON object per line.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    NameRequest,
    MatchStart,
    Countdown {
        value: u32,
    },
    Question {
        round: u32,
        total: u32,
        text: String,
        options: Vec<String>,
        time_limit_secs: u64,
    },
    AnswerResult {
        correct: bool,
    },
    Scoreboard {
        scores: Vec<ScoreEntry>,
        #[serde(rename = "final")]
        is_final: bool,
    },
    GameOver {
        scores: Vec<ScoreEntry>,
    },
    ServerFull,
    /// Any discriminator this build does not know about.
    #[serde(other)]
    Unknown,
}

/// Messages written by a client after the name handshake.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Answer {
        round: u32,
        option: String,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ScoreEntry {
    pub name: String,
    pub score: u32,
}

impl ScoreEntry {
    pub fn new(name: impl Into<String>, score: u32) -> Self {
        Self {
            name: name.into(),
            score,
        }
    }
}

impl ServerMessage {
    /// Encodes the message as a single newline-terminated line.
    pub fn encode(&self) -> serde_json::Result<String> {
        encode_line(self)
    }

    pub fn decode(line: &str) -> serde_json::Result<Self> {
        serde_json::from_str(line.trim())
    }
}

impl ClientMessage {
    pub fn answer(round: u32, option: impl Into<String>) -> Self {
        ClientMessage::Answer {
            round,
            option: option.into(),
        }
    }

    pub fn encode(&self) -> serde_json::Result<String> {
        encode_line(self)
    }

    pub fn decode(line: &str) -> serde_json::Result<Self> {
        serde_json::from_str(line.trim())
    }
}

fn encode_line<T: Serialize>(message: &T) -> serde_json::Result<String> {
    let mut line = serde_json::to_string(message)?;
    line.push('\n');
    Ok(line)
}

/// Returns the leading designator of an option, e.g. `"B"` for `"B) Rome"`.
///
/// The designator is the leading run of alphanumeric characters after
/// trimming. Options without one yield an empty string.
pub fn designator(option: &str) -> &str {
    let trimmed = option.trim_start();
    let end = trimmed
        .char_indices()
        .find(|(_, c)| !c.is_alphanumeric())
        .map(|(i, _)| i)
        .unwrap_or(trimmed.len());
    &trimmed[..end]
}

/// Parses the first line a client sends: its display name.
///
/// Plain lines are trimmed. Clients that JSON-encode the name as a string
/// literal are accepted too. Returns `None` for an empty name.
pub fn parse_player_name(line: &str) -> Option<String> {
    let trimmed = line.trim();
    let name = match serde_json::from_str::<String>(trimmed) {
        Ok(decoded) => decoded.trim().to_string(),
        Err(_) => trimmed.to_string(),
    };

    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}
