// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Reporting store adapters

mod jsonl;
mod noop;

pub use jsonl::JsonlReportSink;
pub use noop::NoOpReportSink;

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeReportSink;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rl_core::Event;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from report writes
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("report write failed: {0}")]
    Failed(String),
}

/// One row in the reporting store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportRow {
    pub event_id: String,
    pub event_type: String,
    pub aggregate_id: String,
    pub occurred_at: DateTime<Utc>,
    pub data: serde_json::Value,
}

impl ReportRow {
    pub fn from_event(event: &Event) -> Result<Self, ReportError> {
        Ok(Self {
            event_id: event.event_id().to_string(),
            event_type: event.event_type().to_string(),
            aggregate_id: event.aggregate_id().to_string(),
            occurred_at: event.occurred_at(),
            data: serde_json::to_value(event.payload())?,
        })
    }
}

/// Adapter for a batch-oriented reporting store
#[async_trait]
pub trait ReportSink: Clone + Send + Sync + 'static {
    /// Write a batch of rows; a failed batch writes nothing
    async fn write_batch(&self, rows: Vec<ReportRow>) -> Result<(), ReportError>;
}
