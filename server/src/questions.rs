//! Question bank loading.
//!
//! The bank is read and validated once at startup. Every match draws a fresh
//! shuffled copy, capped at the configured round count.

use crate::error::QuestionError;
use log::info;
use rand::seq::SliceRandom;
use serde::Deserialize;
use shared::{designator, ServerMessage};
use std::path::Path;

/// One round of a match. The correct option never leaves the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Round {
    /// 1-based position within the match.
    pub id: u32,
    pub text: String,
    pub options: Vec<String>,
    pub correct_option: String,
}

impl Round {
    pub fn new(
        id: u32,
        text: impl Into<String>,
        options: Vec<String>,
        correct_option: impl Into<String>,
    ) -> Self {
        Self {
            id,
            text: text.into(),
            options,
            correct_option: correct_option.into(),
        }
    }

    /// Client-facing announcement of this round.
    pub fn announcement(&self, total: u32, time_limit_secs: u64) -> ServerMessage {
        ServerMessage::Question {
            round: self.id,
            total,
            text: self.text.clone(),
            options: self.options.clone(),
            time_limit_secs,
        }
    }
}

/// Shape of an entry in the question file.
#[derive(Debug, Clone, Deserialize)]
struct QuestionEntry {
    text: String,
    options: Vec<String>,
    answer: String,
}

#[derive(Debug, Clone)]
pub struct QuestionBank {
    entries: Vec<QuestionEntry>,
}

impl QuestionBank {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, QuestionError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| QuestionError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let bank = Self::from_json(&contents)?;
        info!("Loaded {} questions from {}", bank.len(), path.display());
        Ok(bank)
    }

    pub fn from_json(contents: &str) -> Result<Self, QuestionError> {
        let entries: Vec<QuestionEntry> = serde_json::from_str(contents)?;
        if entries.is_empty() {
            return Err(QuestionError::Empty);
        }

        for (index, entry) in entries.iter().enumerate() {
            validate(index + 1, entry)?;
        }

        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Shuffles the bank and returns up to `max` rounds numbered from 1.
    pub fn draw(&self, max: usize) -> Vec<Round> {
        let mut entries = self.entries.clone();
        entries.shuffle(&mut rand::thread_rng());

        entries
            .into_iter()
            .take(max)
            .zip(1u32..)
            .map(|(entry, id)| Round::new(id, entry.text, entry.options, entry.answer))
            .collect()
    }
}

fn validate(index: usize, entry: &QuestionEntry) -> Result<(), QuestionError> {
    let invalid = |reason: &str| QuestionError::Invalid {
        index,
        reason: reason.to_string(),
    };

    if entry.text.trim().is_empty() {
        return Err(invalid("empty text"));
    }
    if entry.options.len() < 2 {
        return Err(invalid("fewer than two options"));
    }

    let answer = designator(&entry.answer);
    if answer.is_empty() {
        return Err(invalid("answer has no designator"));
    }
    if !entry
        .options
        .iter()
        .any(|option| designator(option).eq_ignore_ascii_case(answer))
    {
        return Err(invalid("answer does not match any option"));
    }
    Ok(())
}
