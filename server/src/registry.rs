//! Connected participant tracking for the trivia server
//!
//! This module owns the live participant set and is the only place allowed to
//! mutate it:
//! - Registration with capacity enforcement and id assignment
//! - Idempotent removal, safe to race between disconnect cleanup and teardown
//! - Point-in-time snapshots handed to the round coordinator
//! - Best-effort broadcast to every participant
//! - Score reads and updates
//!
//! A single exclusive lock guards the participant map and every participant
//! field touched here. Broadcasts hold the same lock so they never interleave
//! with list mutation.

use crate::client::{Participant, ParticipantId, ParticipantStream};
use log::{debug, info, warn};
use shared::{ScoreEntry, ServerMessage};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::sync::Mutex;

const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(2);

struct RegistryState {
    /// Ordered by id, which is join order.
    participants: BTreeMap<ParticipantId, Participant>,
    next_id: ParticipantId,
}

/// Single source of truth for who is currently playable.
pub struct ConnectionRegistry {
    state: Mutex<RegistryState>,
    max_participants: usize,
    write_timeout: Duration,
}

impl ConnectionRegistry {
    /// Creates an empty registry. Ids start from 1.
    pub fn new(max_participants: usize) -> Self {
        Self {
            state: Mutex::new(RegistryState {
                participants: BTreeMap::new(),
                next_id: 1,
            }),
            max_participants,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
        }
    }

    pub fn with_write_timeout(mut self, write_timeout: Duration) -> Self {
        self.write_timeout = write_timeout;
        self
    }

    /// Registers a new participant.
    ///
    /// Returns the assigned id and the new live count, or `None` when the
    /// registry is at capacity.
    pub async fn register(
        &self,
        name: impl Into<String>,
        stream: ParticipantStream,
    ) -> Option<(ParticipantId, usize)> {
        self.register_from(name, stream, None).await
    }

    pub async fn register_from(
        &self,
        name: impl Into<String>,
        stream: ParticipantStream,
        addr: Option<SocketAddr>,
    ) -> Option<(ParticipantId, usize)> {
        let mut state = self.state.lock().await;
        if state.participants.len() >= self.max_participants {
            return None;
        }

        let id = state.next_id;
        state.next_id += 1;

        let mut participant = Participant::new(id, name.into(), stream);
        participant.addr = addr;
        let name = participant.name.clone();
        state.participants.insert(id, participant);

        let count = state.participants.len();
        info!(
            "{} joined as participant {} ({}/{} connected)",
            name, id, count, self.max_participants
        );
        Some((id, count))
    }

    /// Removes a participant. Removing an absent id is a no-op returning false.
    pub async fn remove(&self, id: ParticipantId) -> bool {
        let mut state = self.state.lock().await;
        match state.participants.remove(&id) {
            Some(participant) => {
                info!(
                    "{} left ({}/{} remaining)",
                    participant.name,
                    state.participants.len(),
                    self.max_participants
                );
                true
            }
            None => false,
        }
    }

    /// Copies the current participant list in join order.
    ///
    /// The copy goes stale as soon as the lock is released.
    pub async fn snapshot(&self) -> Vec<Participant> {
        let state = self.state.lock().await;
        state.participants.values().cloned().collect()
    }

    /// Writes `message` to every participant.
    ///
    /// Individual write failures are logged and skipped; they surface later as
    /// a read failure on that participant's own connection.
    pub async fn broadcast(&self, message: &ServerMessage) {
        let line = match message.encode() {
            Ok(line) => line,
            Err(e) => {
                warn!("Failed to encode broadcast: {}", e);
                return;
            }
        };

        let state = self.state.lock().await;
        for participant in state.participants.values() {
            if let Err(e) = participant
                .stream
                .write_bytes(line.as_bytes(), self.write_timeout)
                .await
            {
                debug!("Broadcast to {} failed: {}", participant.name, e);
            }
        }
    }

    /// Best-effort write to a single participant. Returns false if the id is
    /// unknown or the write failed.
    pub async fn send_to(&self, id: ParticipantId, message: &ServerMessage) -> bool {
        let stream = {
            let state = self.state.lock().await;
            match state.participants.get(&id) {
                Some(participant) => participant.stream.clone(),
                None => return false,
            }
        };

        match stream.send(message, self.write_timeout).await {
            Ok(()) => true,
            Err(e) => {
                debug!("Send to participant {} failed: {}", id, e);
                false
            }
        }
    }

    pub async fn score_of(&self, id: ParticipantId) -> Option<u32> {
        let state = self.state.lock().await;
        state.participants.get(&id).map(|p| p.score)
    }

    /// Adds `delta` to a participant's score and returns the new total.
    ///
    /// The delta is dropped silently if the participant already left.
    pub async fn update_score(&self, id: ParticipantId, delta: u32) -> Option<u32> {
        let mut state = self.state.lock().await;
        let participant = state.participants.get_mut(&id)?;
        participant.score = participant.score.saturating_add(delta);
        Some(participant.score)
    }

    pub async fn reset_scores(&self) {
        let mut state = self.state.lock().await;
        for participant in state.participants.values_mut() {
            participant.score = 0;
        }
    }

    /// Scoreboard entries, highest score first. Ties keep join order.
    pub async fn standings(&self) -> Vec<ScoreEntry> {
        let state = self.state.lock().await;
        let mut entries: Vec<ScoreEntry> = state
            .participants
            .values()
            .map(|p| ScoreEntry::new(p.name.clone(), p.score))
            .collect();
        entries.sort_by(|a, b| b.score.cmp(&a.score));
        entries
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.participants.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn is_full(&self) -> bool {
        self.len().await >= self.max_participants
    }

    pub fn capacity(&self) -> usize {
        self.max_participants
    }
}
