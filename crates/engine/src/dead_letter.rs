// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bounded dead-letter queue

use crate::error::EventHandlingError;
use chrono::{DateTime, Utc};
use rl_core::{DeadLetterConfig, Event, ExecutionContext};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Mutex;

/// An (event, target) pair that exhausted its retries
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetter {
    pub event: Event,
    pub context: ExecutionContext,
    pub target: String,
    pub error: EventHandlingError,
    pub attempts: u32,
    pub failed_at: DateTime<Utc>,
}

/// Once the queue grows past `max_entries`, the oldest half is dropped.
pub struct DeadLetterQueue {
    entries: Mutex<VecDeque<DeadLetter>>,
    max_entries: usize,
}

impl DeadLetterQueue {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
            max_entries: max_entries.max(1),
        }
    }

    pub fn from_config(config: &DeadLetterConfig) -> Self {
        Self::new(config.max_entries)
    }

    pub fn push(&self, letter: DeadLetter) {
        tracing::warn!(
            event_id = letter.event.event_id(),
            event_type = letter.event.event_type(),
            target = %letter.target,
            attempts = letter.attempts,
            error = %letter.error.failure,
            "event dead-lettered"
        );

        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.push_back(letter);
        if entries.len() > self.max_entries {
            let evicted = entries.len() / 2;
            entries.drain(..evicted);
            tracing::warn!(
                evicted,
                remaining = entries.len(),
                "dead-letter queue over capacity, dropped oldest entries"
            );
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Oldest first
    pub fn snapshot(&self) -> Vec<DeadLetter> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .cloned()
            .collect()
    }

    /// Empty the queue, returning how many entries were removed
    pub fn clear(&self) -> usize {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let removed = entries.len();
        entries.clear();
        removed
    }
}

impl Default for DeadLetterQueue {
    fn default() -> Self {
        Self::from_config(&DeadLetterConfig::default())
    }
}

#[cfg(test)]
#[path = "dead_letter_tests.rs"]
mod tests;
