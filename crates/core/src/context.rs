// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Execution context carried alongside every delivery

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// What kind of operation originated an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationType {
    ApiRequest,
    WebSocket,
    BackgroundTask,
    Scheduled,
    Replay,
    System,
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OperationType::ApiRequest => "api_request",
            OperationType::WebSocket => "websocket",
            OperationType::BackgroundTask => "background_task",
            OperationType::Scheduled => "scheduled",
            OperationType::Replay => "replay",
            OperationType::System => "system",
        };
        f.write_str(s)
    }
}

/// Correlates a delivery or audit entry back to the request that caused it.
///
/// Created once per inbound operation and read-only afterwards; the `with_*`
/// builders consume the value so they can only be used while constructing it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionContext {
    correlation_id: String,
    user_id: Option<String>,
    session_id: Option<String>,
    timestamp: DateTime<Utc>,
    operation_type: OperationType,
}

impl ExecutionContext {
    pub fn new(operation_type: OperationType) -> Self {
        Self {
            correlation_id: uuid::Uuid::new_v4().to_string(),
            user_id: None,
            session_id: None,
            timestamp: Utc::now(),
            operation_type,
        }
    }

    /// Context used when a publisher supplies none
    pub fn system() -> Self {
        Self::new(OperationType::System)
    }

    /// Context for a replay of stored events, keeping the original correlation
    pub fn replay_of(original: &ExecutionContext) -> Self {
        Self {
            operation_type: OperationType::Replay,
            timestamp: Utc::now(),
            ..original.clone()
        }
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = correlation_id.into();
        self
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn operation_type(&self) -> OperationType {
        self.operation_type
    }
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::system()
    }
}
