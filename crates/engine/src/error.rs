// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for the event bus

use rl_core::{EventValidationError, HandlerError};
use rl_storage::StreamError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a single delivery attempt failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HandlingFailure {
    #[error("{reason}")]
    Handler { reason: String },
    #[error("permanent failure: {reason}")]
    Permanent { reason: String },
    #[error("timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
    /// Rejected by the worker's circuit breaker without invoking it
    #[error("circuit open")]
    CircuitOpen,
    #[error("cancelled during shutdown")]
    Cancelled,
}

impl HandlingFailure {
    /// Failures that end the retry loop immediately
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            HandlingFailure::Permanent { .. }
                | HandlingFailure::CircuitOpen
                | HandlingFailure::Cancelled
        )
    }
}

impl From<HandlerError> for HandlingFailure {
    fn from(err: HandlerError) -> Self {
        match err {
            HandlerError::Failed(reason) => HandlingFailure::Handler { reason },
            HandlerError::Permanent(reason) => HandlingFailure::Permanent { reason },
            HandlerError::Timeout(after) => HandlingFailure::Timeout {
                timeout_ms: after.as_millis() as u64,
            },
        }
    }
}

/// A specific worker or handler failed to process a specific event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{target} failed on event {event_id} after {retry_count} retries: {failure}")]
pub struct EventHandlingError {
    /// Worker or handler name
    pub target: String,
    /// Set when the target is a registered worker
    pub worker_id: Option<String>,
    pub event_id: String,
    pub retry_count: u32,
    pub failure: HandlingFailure,
}

impl EventHandlingError {
    pub fn is_circuit_open(&self) -> bool {
        self.failure == HandlingFailure::CircuitOpen
    }
}

/// Every target that failed for one published event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("event {event_id} failed for {} target(s)", .failures.len())]
pub struct EventFailure {
    pub event_id: String,
    pub failures: Vec<EventHandlingError>,
}

/// Errors surfaced to publishers and bus operators
#[derive(Debug, Error)]
pub enum EventBusError {
    #[error("event bus is not running")]
    NotRunning,
    #[error("invalid event: {0}")]
    InvalidEvent(#[from] EventValidationError),
    #[error("worker already registered: {0}")]
    DuplicateWorker(String),
    #[error(transparent)]
    Handling(EventFailure),
    #[error("{} event(s) in the batch failed", .0.len())]
    Batch(Vec<EventFailure>),
    #[error("stream error: {0}")]
    Stream(#[from] StreamError),
}

impl EventBusError {
    /// Per-event failures carried by this error, if any
    pub fn failures(&self) -> &[EventFailure] {
        match self {
            EventBusError::Handling(failure) => std::slice::from_ref(failure),
            EventBusError::Batch(failures) => failures,
            _ => &[],
        }
    }
}
