// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker and handler traits

use crate::context::ExecutionContext;
use crate::event::Event;
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Failure reported by a worker or handler
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandlerError {
    #[error("{0}")]
    Failed(String),
    /// Do not retry; remaining attempts are skipped
    #[error("permanent failure: {0}")]
    Permanent(String),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

impl HandlerError {
    pub fn failed(reason: impl Into<String>) -> Self {
        HandlerError::Failed(reason.into())
    }

    pub fn permanent(reason: impl Into<String>) -> Self {
        HandlerError::Permanent(reason.into())
    }

    pub fn is_permanent(&self) -> bool {
        matches!(self, HandlerError::Permanent(_))
    }
}

/// Retry, batching and timeout tunables for a worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerSettings {
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub batch_size: usize,
    pub processing_timeout: Duration,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay: Duration::from_secs(1),
            batch_size: 100,
            processing_timeout: Duration::from_secs(30),
        }
    }
}

/// A long-lived consumer with a lifecycle, owned by a worker registry
#[async_trait]
pub trait EventWorker: Send + Sync + 'static {
    /// Stable identity, unique within a registry
    fn worker_name(&self) -> &str;

    /// Event types accepted by the default [`can_handle`](Self::can_handle)
    fn handled_event_types(&self) -> &[&str] {
        &[]
    }

    fn can_handle(&self, event: &Event) -> bool {
        self.handled_event_types()
            .iter()
            .any(|t| *t == event.event_type())
    }

    fn settings(&self) -> WorkerSettings {
        WorkerSettings::default()
    }

    /// Consumer group on stream-backed buses; defaults to the worker name
    fn consumer_group(&self) -> Option<&str> {
        None
    }

    async fn initialize(&self) -> Result<(), HandlerError> {
        Ok(())
    }

    async fn process_event(
        &self,
        event: &Event,
        context: &ExecutionContext,
    ) -> Result<(), HandlerError>;

    /// Runs while stopping; batching workers flush here
    async fn cleanup(&self) -> Result<(), HandlerError> {
        Ok(())
    }
}

/// A lightweight subscriber bound to an event type on a bus
#[async_trait]
pub trait EventHandler: Send + Sync + 'static {
    fn handler_name(&self) -> &str;

    async fn handle(&self, event: &Event, context: &ExecutionContext) -> Result<(), HandlerError>;
}
