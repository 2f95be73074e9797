//! Deadline-bounded answer collection.
//!
//! One reader task per participant reads that participant's lines with short,
//! bounded attempts and sends the first well-formed answer for the current
//! round to a shared channel. The coordinator drains the channel against an
//! absolute deadline, waking at least every `drain_poll_interval` to re-check
//! it, so a silent or slow client can never hold the round open.

use crate::client::{LineReader, Participant};
use crate::config::SessionConfig;
use crate::registry::ConnectionRegistry;
use crate::scoring::{is_correct, Answer};
use log::{debug, info};
use shared::{ClientMessage, ServerMessage};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::{timeout, Instant};

pub struct AnswerCollector {
    registry: Arc<ConnectionRegistry>,
    read_attempt_timeout: Duration,
    drain_poll_interval: Duration,
    write_timeout: Duration,
    immediate_feedback: bool,
}

/// Everything a reader task needs besides its participant.
#[derive(Clone)]
struct ReadContext {
    round: u32,
    correct_option: Arc<str>,
    deadline: Instant,
    attempt_timeout: Duration,
    write_timeout: Duration,
    immediate_feedback: bool,
    registry: Arc<ConnectionRegistry>,
    answers: mpsc::Sender<Answer>,
}

enum ReadOutcome {
    Answered(String),
    Expired,
    Disconnected,
}

impl AnswerCollector {
    pub fn new(registry: Arc<ConnectionRegistry>, config: &SessionConfig) -> Self {
        Self {
            registry,
            read_attempt_timeout: config.read_attempt_timeout,
            drain_poll_interval: config.drain_poll_interval,
            write_timeout: Duration::from_secs(2),
            immediate_feedback: config.immediate_feedback,
        }
    }

    pub fn with_write_timeout(mut self, write_timeout: Duration) -> Self {
        self.write_timeout = write_timeout;
        self
    }

    /// Collects at most one answer per participant for `round` within `window`.
    ///
    /// Participants that stay silent, disconnect, or only send malformed lines
    /// are simply absent from the result. Disconnected participants are removed
    /// from the registry on a detached task.
    pub async fn collect(
        &self,
        round: u32,
        participants: Vec<Participant>,
        correct_option: &str,
        window: Duration,
    ) -> Vec<Answer> {
        let deadline = Instant::now() + window;
        let expected = participants.len();
        if expected == 0 {
            return Vec::new();
        }

        let (tx, mut rx) = mpsc::channel(expected);
        let context = ReadContext {
            round,
            correct_option: Arc::from(correct_option),
            deadline,
            attempt_timeout: self.read_attempt_timeout,
            write_timeout: self.write_timeout,
            immediate_feedback: self.immediate_feedback,
            registry: Arc::clone(&self.registry),
            answers: tx,
        };

        let mut readers = JoinSet::new();
        for participant in participants {
            readers.spawn(read_answer(participant, context.clone()));
        }
        // Only the reader tasks keep the channel open from here on.
        drop(context);

        let mut answers = Vec::with_capacity(expected);
        while answers.len() < expected && Instant::now() < deadline {
            let idle = self
                .drain_poll_interval
                .min(deadline.saturating_duration_since(Instant::now()));
            match timeout(idle, rx.recv()).await {
                Ok(Some(answer)) => answers.push(answer),
                Ok(None) => break,
                Err(_) => continue,
            }
        }

        // Stragglers still mid-attempt hold their participant's reader lock.
        readers.shutdown().await;

        info!(
            "Round {}: collected {}/{} answers",
            round,
            answers.len(),
            expected
        );
        answers
    }
}

async fn read_answer(participant: Participant, context: ReadContext) {
    let reader = participant.stream.reader();
    let outcome = {
        let mut lines = reader.lock().await;
        read_until_answer(&mut lines, &participant, &context).await
    };

    match outcome {
        ReadOutcome::Answered(option) => {
            let received_at = Instant::now();
            let correct = is_correct(&option, &context.correct_option);

            let answer = Answer {
                participant: participant.id,
                name: participant.name.clone(),
                option,
                received_at,
            };
            let _ = context.answers.send(answer).await;

            // Detached so a stalled client cannot delay the answer or be cut
            // off mid-line when the round's readers are shut down.
            if context.immediate_feedback {
                let write_timeout = context.write_timeout;
                tokio::spawn(async move {
                    if let Err(e) = participant
                        .stream
                        .send(&ServerMessage::AnswerResult { correct }, write_timeout)
                        .await
                    {
                        debug!("Feedback to {} failed: {}", participant.name, e);
                    }
                });
            }
        }
        ReadOutcome::Expired => {}
        ReadOutcome::Disconnected => {
            let registry = Arc::clone(&context.registry);
            let id = participant.id;
            tokio::spawn(async move {
                registry.remove(id).await;
            });
        }
    }
}

async fn read_until_answer(
    lines: &mut LineReader,
    participant: &Participant,
    context: &ReadContext,
) -> ReadOutcome {
    loop {
        let now = Instant::now();
        if now >= context.deadline {
            return ReadOutcome::Expired;
        }
        let attempt = context
            .attempt_timeout
            .min(context.deadline.saturating_duration_since(now));

        match timeout(attempt, lines.next_line()).await {
            Err(_) => continue,
            Ok(Ok(Some(line))) => match ClientMessage::decode(&line) {
                Ok(ClientMessage::Answer { round, option }) if round == context.round => {
                    return ReadOutcome::Answered(option);
                }
                Ok(ClientMessage::Answer { round, .. }) => {
                    debug!(
                        "Discarding answer for round {} from {} during round {}",
                        round, participant.name, context.round
                    );
                }
                Ok(ClientMessage::Unknown) => {
                    debug!("Ignoring unknown message from {}", participant.name);
                }
                Err(e) => {
                    debug!("Discarding malformed line from {}: {}", participant.name, e);
                }
            },
            Ok(Ok(None)) => {
                debug!("{} closed the connection", participant.name);
                return ReadOutcome::Disconnected;
            }
            Ok(Err(e)) => {
                debug!("Read from {} failed: {}", participant.name, e);
                return ReadOutcome::Disconnected;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ParticipantStream;
    use tokio::io::{duplex, split, AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio_test::io::Builder;

    fn answer_line(round: u32, option: &str) -> Vec<u8> {
        ClientMessage::answer(round, option)
            .encode()
            .unwrap()
            .into_bytes()
    }

    fn collector(registry: &Arc<ConnectionRegistry>, feedback: bool) -> AnswerCollector {
        let config = SessionConfig {
            immediate_feedback: feedback,
            ..SessionConfig::default()
        };
        AnswerCollector::new(Arc::clone(registry), &config)
    }

    /// Registers a participant whose inbound bytes follow `builder`'s script.
    async fn scripted(registry: &ConnectionRegistry, name: &str, builder: &mut Builder) -> u32 {
        let stream = ParticipantStream::new(builder.build(), tokio::io::sink());
        registry.register(name, stream).await.unwrap().0
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_participants_returns_immediately() {
        let registry = Arc::new(ConnectionRegistry::new(4));
        let started = Instant::now();

        let answers = collector(&registry, false)
            .collect(1, Vec::new(), "A", Duration::from_secs(10))
            .await;

        assert!(answers.is_empty());
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_participants_bounded_by_window() {
        let registry = Arc::new(ConnectionRegistry::new(4));
        scripted(&registry, "Ada", Builder::new().wait(Duration::from_secs(60))).await;
        scripted(&registry, "Grace", Builder::new().wait(Duration::from_secs(60))).await;

        let started = Instant::now();
        let answers = collector(&registry, false)
            .collect(1, registry.snapshot().await, "A", Duration::from_secs(10))
            .await;

        assert!(answers.is_empty());
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(10));
        assert!(elapsed <= Duration::from_millis(10_200), "took {:?}", elapsed);
        assert_eq!(registry.len().await, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_silent_participant_does_not_block_others() {
        let registry = Arc::new(ConnectionRegistry::new(4));
        scripted(
            &registry,
            "Ada",
            Builder::new()
                .wait(Duration::from_millis(1500))
                .read(&answer_line(1, "A")),
        )
        .await;
        scripted(&registry, "Grace", Builder::new().wait(Duration::from_secs(60))).await;

        let started = Instant::now();
        let answers = collector(&registry, false)
            .collect(1, registry.snapshot().await, "A", Duration::from_secs(10))
            .await;

        assert_eq!(answers.len(), 1);
        assert_eq!(answers[0].name, "Ada");
        let answered_after = answers[0].received_at - started;
        assert!(answered_after >= Duration::from_millis(1500));
        assert!(answered_after < Duration::from_millis(1600));
        assert!(started.elapsed() <= Duration::from_millis(10_200));
    }

    #[tokio::test(start_paused = true)]
    async fn test_returns_early_when_everyone_answered() {
        let registry = Arc::new(ConnectionRegistry::new(4));
        scripted(&registry, "Ada", Builder::new().read(&answer_line(1, "A"))).await;
        scripted(
            &registry,
            "Grace",
            Builder::new()
                .wait(Duration::from_secs(2))
                .read(&answer_line(1, "B")),
        )
        .await;

        let started = Instant::now();
        let answers = collector(&registry, false)
            .collect(1, registry.snapshot().await, "A", Duration::from_secs(10))
            .await;

        assert_eq!(answers.len(), 2);
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_valid_answer_only() {
        let registry = Arc::new(ConnectionRegistry::new(4));
        let (server_side, mut client_side) = duplex(1024);
        let (read_half, write_half) = split(server_side);
        registry
            .register("Ada", ParticipantStream::new(read_half, write_half))
            .await
            .unwrap();

        let mut burst = answer_line(1, "C");
        burst.extend(answer_line(1, "B"));
        burst.extend(answer_line(1, "A"));
        client_side.write_all(&burst).await.unwrap();

        let answers = collector(&registry, false)
            .collect(1, registry.snapshot().await, "B", Duration::from_secs(10))
            .await;

        assert_eq!(answers.len(), 1);
        assert_eq!(answers[0].option, "C");
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_and_stale_lines_are_skipped() {
        let registry = Arc::new(ConnectionRegistry::new(4));
        scripted(
            &registry,
            "Ada",
            Builder::new()
                .read(b"not json\n")
                .read(b"{\"type\":\"chat\",\"text\":\"hello\"}\n")
                .read(b"{\"type\":\"answer\",\"round\":\"one\"}\n")
                .read(&answer_line(1, "D"))
                .wait(Duration::from_millis(300))
                .read(&answer_line(2, "B")),
        )
        .await;

        let answers = collector(&registry, false)
            .collect(2, registry.snapshot().await, "B", Duration::from_secs(10))
            .await;

        assert_eq!(answers.len(), 1);
        assert_eq!(answers[0].option, "B");
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_removes_participant() {
        let registry = Arc::new(ConnectionRegistry::new(4));
        scripted(
            &registry,
            "Ada",
            Builder::new().read_error(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "reset",
            )),
        )
        .await;
        scripted(&registry, "Grace", Builder::new().read(&answer_line(1, "A"))).await;

        let answers = collector(&registry, false)
            .collect(1, registry.snapshot().await, "A", Duration::from_secs(10))
            .await;
        assert_eq!(answers.len(), 1);
        assert_eq!(answers[0].name, "Grace");

        // Removal runs on its own task.
        tokio::time::sleep(Duration::from_millis(10)).await;
        let names: Vec<String> = registry
            .snapshot()
            .await
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(names, vec!["Grace".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_immediate_feedback() {
        let registry = Arc::new(ConnectionRegistry::new(4));
        let (server_side, client_side) = duplex(1024);
        let (read_half, write_half) = split(server_side);
        registry
            .register("Ada", ParticipantStream::new(read_half, write_half))
            .await
            .unwrap();

        let (client_read, mut client_write) = split(client_side);
        client_write
            .write_all(&answer_line(4, "B) Rome"))
            .await
            .unwrap();

        let answers = collector(&registry, true)
            .collect(4, registry.snapshot().await, "B", Duration::from_secs(10))
            .await;
        assert_eq!(answers.len(), 1);

        let mut lines = BufReader::new(client_read).lines();
        let line = lines.next_line().await.unwrap().unwrap();
        assert_eq!(
            ServerMessage::decode(&line).unwrap(),
            ServerMessage::AnswerResult { correct: true }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_feedback_keeps_late_answer() {
        let registry = Arc::new(ConnectionRegistry::new(4));
        // The client never reads, so a feedback line cannot fit in the pipe.
        let (write_half, _unread_client) = duplex(16);
        let stream = ParticipantStream::new(
            Builder::new()
                .wait(Duration::from_secs(9))
                .read(&answer_line(1, "B"))
                .wait(Duration::from_secs(60))
                .build(),
            write_half,
        );
        registry.register("Ada", stream).await.unwrap();

        let started = Instant::now();
        let answers = collector(&registry, true)
            .collect(1, registry.snapshot().await, "B", Duration::from_secs(10))
            .await;

        assert_eq!(answers.len(), 1);
        assert_eq!(answers[0].option, "B");
        assert!(answers[0].received_at - started >= Duration::from_secs(9));
        assert!(started.elapsed() < Duration::from_secs(10), "took {:?}", started.elapsed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reader_is_released_for_next_round() {
        let registry = Arc::new(ConnectionRegistry::new(4));
        let (server_side, mut client_side) = duplex(1024);
        let (read_half, write_half) = split(server_side);
        registry
            .register("Ada", ParticipantStream::new(read_half, write_half))
            .await
            .unwrap();
        let collector = collector(&registry, false);

        let first = collector
            .collect(1, registry.snapshot().await, "A", Duration::from_secs(2))
            .await;
        assert!(first.is_empty());

        client_side.write_all(&answer_line(2, "A")).await.unwrap();
        let second = collector
            .collect(2, registry.snapshot().await, "A", Duration::from_secs(2))
            .await;
        assert_eq!(second.len(), 1);
    }
}
