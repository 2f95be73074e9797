//! Runtime configuration for the server and the match state machine.

use crate::error::ServerError;
use clap::ValueEnum;
use shared::{COUNTDOWN_FROM, INTER_ROUND_DELAY_SECS, ROUND_WINDOW_SECS};
use std::time::Duration;

/// What happens after a match ends or the operator starts an empty lobby.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum MatchMode {
    /// Play one match, then exit. An empty lobby aborts.
    Single,
    /// Return to the lobby after every match. An empty lobby re-prompts.
    Continuous,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub max_players: usize,
    /// How long a new connection has to send its name.
    pub handshake_timeout: Duration,
    /// Bound on each best-effort write to a participant.
    pub write_timeout: Duration,
    pub max_rounds: usize,
    pub mode: MatchMode,
    /// Start automatically once this many players are registered.
    pub auto_start: Option<usize>,
    pub session: SessionConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_players: 8,
            handshake_timeout: Duration::from_secs(60),
            write_timeout: Duration::from_secs(2),
            max_rounds: 10,
            mode: MatchMode::Single,
            auto_start: None,
            session: SessionConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Rejects settings that would leave the server unable to run a match.
    pub fn validate(&self) -> Result<(), ServerError> {
        if self.max_players == 0 {
            return Err(ServerError::Config("max players must be at least 1".into()));
        }
        if self.max_rounds == 0 {
            return Err(ServerError::Config("max rounds must be at least 1".into()));
        }
        match self.auto_start {
            Some(0) => Err(ServerError::Config(
                "auto-start threshold must be at least 1".into(),
            )),
            Some(threshold) if threshold > self.max_players => Err(ServerError::Config(format!(
                "auto-start threshold {} exceeds max players {}",
                threshold, self.max_players
            ))),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub round_window: Duration,
    pub inter_round_delay: Duration,
    pub countdown_from: u32,
    pub countdown_step: Duration,
    /// Upper bound of a single read attempt inside the round window.
    pub read_attempt_timeout: Duration,
    /// Idle wake-up used by the collector to re-check the deadline.
    pub drain_poll_interval: Duration,
    pub immediate_feedback: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            round_window: Duration::from_secs(ROUND_WINDOW_SECS),
            inter_round_delay: Duration::from_secs(INTER_ROUND_DELAY_SECS),
            countdown_from: COUNTDOWN_FROM,
            countdown_step: Duration::from_secs(1),
            read_attempt_timeout: Duration::from_secs(1),
            drain_poll_interval: Duration::from_millis(100),
            immediate_feedback: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(ServerConfig::default().validate().is_ok());
    }

    #[test]
    fn test_zero_auto_start_rejected() {
        let config = ServerConfig {
            mode: MatchMode::Continuous,
            auto_start: Some(0),
            ..ServerConfig::default()
        };
        assert!(matches!(config.validate(), Err(ServerError::Config(_))));
    }

    #[test]
    fn test_unreachable_auto_start_rejected() {
        let config = ServerConfig {
            max_players: 2,
            auto_start: Some(3),
            ..ServerConfig::default()
        };
        assert!(matches!(config.validate(), Err(ServerError::Config(_))));

        let config = ServerConfig {
            auto_start: Some(2),
            ..config
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let config = ServerConfig {
            max_players: 0,
            ..ServerConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
