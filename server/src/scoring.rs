//! Round scoring.
//!
//! Scoring is a pure function of the answers collected for one round and that
//! round's correct option. It touches no shared state, so it can be called with
//! a literal answer list.

use crate::client::ParticipantId;
use shared::{designator, FIRST_PLACE_POINTS};
use tokio::time::Instant;

/// One accepted answer, stamped with the server's receipt time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Answer {
    pub participant: ParticipantId,
    pub name: String,
    pub option: String,
    pub received_at: Instant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoreDelta {
    pub participant: ParticipantId,
    pub name: String,
    pub points: u32,
}

/// Whether `submitted` names the correct option.
///
/// The submitted value must start with the correct option's designator,
/// ignoring ASCII case, so both `"B"` and `"B) Rome"` match a correct `"B"`.
pub fn is_correct(submitted: &str, correct_option: &str) -> bool {
    let expected = designator(correct_option);
    if expected.is_empty() {
        return false;
    }

    let submitted = submitted.trim();
    submitted
        .get(..expected.len())
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case(expected))
}

/// Computes the points each correct answerer earns this round.
///
/// Correct answers are ranked by receipt time; ties keep submission order.
/// The fastest gets [`FIRST_PLACE_POINTS`] and each following one half of the
/// previous award, rounded down. Once the award reaches zero nobody else is
/// listed. Wrong and missing answers get no entry.
pub fn score(answers: &[Answer], correct_option: &str) -> Vec<ScoreDelta> {
    let mut correct: Vec<&Answer> = answers
        .iter()
        .filter(|answer| is_correct(&answer.option, correct_option))
        .collect();
    correct.sort_by_key(|answer| answer.received_at);

    let mut deltas = Vec::with_capacity(correct.len());
    let mut points = FIRST_PLACE_POINTS;
    for answer in correct {
        if points == 0 {
            break;
        }
        deltas.push(ScoreDelta {
            participant: answer.participant,
            name: answer.name.clone(),
            points,
        });
        points /= 2;
    }
    deltas
}
