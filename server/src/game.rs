use crate::collector::AnswerCollector;
use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::questions::Round;
use crate::registry::ConnectionRegistry;
use crate::scoring::{score, ScoreDelta};
use log::{info, warn};
use shared::{ScoreEntry, ServerMessage};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

/// Where the match currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Lobby,
    Countdown,
    RoundInProgress { round: u32 },
    Scoreboard { round: u32, is_final: bool },
    Finished,
}

/// Runs matches over the participants held by a [`ConnectionRegistry`].
///
/// Rounds are strictly sequential: a round's deltas are applied before the next
/// question is broadcast.
pub struct GameSession {
    registry: Arc<ConnectionRegistry>,
    collector: AnswerCollector,
    config: SessionConfig,
    phase: Phase,
    rounds: Vec<Round>,
    current_round: Option<usize>,
}

impl GameSession {
    pub fn new(registry: Arc<ConnectionRegistry>, config: SessionConfig) -> Self {
        Self {
            collector: AnswerCollector::new(Arc::clone(&registry), &config),
            registry,
            config,
            phase: Phase::Lobby,
            rounds: Vec::new(),
            current_round: None,
        }
    }

    pub fn with_write_timeout(mut self, write_timeout: Duration) -> Self {
        self.collector = self.collector.with_write_timeout(write_timeout);
        self
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn current_round(&self) -> Option<&Round> {
        self.current_round.and_then(|index| self.rounds.get(index))
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Leaves the lobby with `rounds` queued.
    ///
    /// Fails without changing phase if nobody is registered or there is
    /// nothing to play.
    pub async fn start(&mut self, rounds: Vec<Round>) -> Result<(), SessionError> {
        if self.phase != Phase::Lobby {
            return Err(SessionError::NotInLobby(self.phase));
        }
        if rounds.is_empty() {
            return Err(SessionError::NoRounds);
        }
        if self.registry.is_empty().await {
            return Err(SessionError::EmptyLobby);
        }

        self.rounds = rounds;
        self.current_round = None;
        self.phase = Phase::Countdown;
        Ok(())
    }

    /// Plays a whole match and returns the final standings.
    pub async fn run_match(&mut self, rounds: Vec<Round>) -> Result<Vec<ScoreEntry>, SessionError> {
        self.start(rounds).await?;
        info!(
            "Starting match: {} rounds, {} players",
            self.rounds.len(),
            self.registry.len().await
        );

        self.countdown().await;

        let total = self.rounds.len();
        for index in 0..total {
            if self.registry.is_empty().await {
                warn!("Every player left, ending the match early");
                break;
            }

            self.play_round(index).await;

            let is_final = index + 1 == total;
            self.show_scoreboard(is_final).await;
            if !is_final {
                sleep(self.config.inter_round_delay).await;
            }
        }

        Ok(self.finish().await)
    }

    async fn countdown(&mut self) {
        self.phase = Phase::Countdown;
        self.registry.broadcast(&ServerMessage::MatchStart).await;

        for value in (0..=self.config.countdown_from).rev() {
            self.registry
                .broadcast(&ServerMessage::Countdown { value })
                .await;
            if value > 0 {
                sleep(self.config.countdown_step).await;
            }
        }
    }

    /// Announces round `index`, collects answers, and applies the deltas.
    pub async fn play_round(&mut self, index: usize) -> Vec<ScoreDelta> {
        let Some(round) = self.rounds.get(index).cloned() else {
            return Vec::new();
        };
        self.current_round = Some(index);
        self.phase = Phase::RoundInProgress { round: round.id };

        let total = self.rounds.len() as u32;
        info!("Round {}/{}: {}", round.id, total, round.text);

        let participants = self.registry.snapshot().await;
        self.registry
            .broadcast(&round.announcement(total, self.config.round_window.as_secs()))
            .await;

        let answers = self
            .collector
            .collect(
                round.id,
                participants,
                &round.correct_option,
                self.config.round_window,
            )
            .await;

        let deltas = score(&answers, &round.correct_option);
        for delta in &deltas {
            match self.registry.update_score(delta.participant, delta.points).await {
                Some(total) => info!("{} +{} ({} total)", delta.name, delta.points, total),
                None => info!("{} left before scoring, dropping +{}", delta.name, delta.points),
            }
        }
        deltas
    }

    async fn show_scoreboard(&mut self, is_final: bool) {
        let round = self.current_round().map(|r| r.id).unwrap_or_default();
        self.phase = Phase::Scoreboard { round, is_final };

        let scores = self.registry.standings().await;
        self.registry
            .broadcast(&ServerMessage::Scoreboard { scores, is_final })
            .await;
    }

    async fn finish(&mut self) -> Vec<ScoreEntry> {
        self.phase = Phase::Finished;
        let scores = self.registry.standings().await;
        self.registry
            .broadcast(&ServerMessage::GameOver {
                scores: scores.clone(),
            })
            .await;

        for (place, entry) in scores.iter().enumerate() {
            info!("{}. {} - {} points", place + 1, entry.name, entry.score);
        }
        scores
    }

    /// Returns to the lobby for another match. Scores start over.
    pub async fn reset(&mut self) {
        self.registry.reset_scores().await;
        self.rounds.clear();
        self.current_round = None;
        self.phase = Phase::Lobby;
    }
}
