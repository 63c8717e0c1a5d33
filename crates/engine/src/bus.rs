// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The event bus contract

use crate::dead_letter::DeadLetter;
use crate::error::{EventBusError, EventFailure};
use crate::registry::WorkerSnapshot;
use crate::subscription::SubscribeOptions;
use async_trait::async_trait;
use rl_core::{BusMetrics, Event, EventHandler, EventPattern, ExecutionContext, HealthStatus};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Outcome of [`EventBus::stop`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShutdownReport {
    /// Every in-flight delivery finished within the grace period
    pub drained_cleanly: bool,
    /// Deliveries cancelled after the grace period and dead-lettered
    pub cancelled: usize,
}

impl Default for ShutdownReport {
    fn default() -> Self {
        Self {
            drained_cleanly: true,
            cancelled: 0,
        }
    }
}

/// Outcome of replaying stored events
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayReport {
    pub replayed: usize,
    pub failed: Vec<EventFailure>,
}

/// Publish/subscribe bus delivering events to workers and handlers.
///
/// A bus must be started before it accepts publishes. Stopping it stops
/// accepting publishes, drains what is in flight and runs every worker's
/// cleanup before returning.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Deliver `event` to every matching worker and subscription.
    ///
    /// `context` defaults to a system context. `routing_key` is carried with
    /// the event; routing itself is by event type.
    async fn publish(
        &self,
        event: Event,
        routing_key: Option<&str>,
        context: Option<ExecutionContext>,
    ) -> Result<(), EventBusError>;

    /// Publish events in order, one publish completing before the next.
    ///
    /// Handling failures do not stop the batch; they are collected into
    /// [`EventBusError::Batch`]. Any other error aborts the remainder.
    async fn publish_batch(
        &self,
        events: Vec<Event>,
        context: Option<ExecutionContext>,
    ) -> Result<(), EventBusError> {
        let mut failures = Vec::new();
        for event in events {
            match self.publish(event, None, context.clone()).await {
                Ok(()) => {}
                Err(EventBusError::Handling(failure)) => failures.push(failure),
                Err(e) => return Err(e),
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(EventBusError::Batch(failures))
        }
    }

    fn subscribe(
        &self,
        pattern: EventPattern,
        handler: Arc<dyn EventHandler>,
        consumer_group: Option<String>,
        options: SubscribeOptions,
    );

    /// Returns false if the handler was not subscribed to `pattern`
    fn unsubscribe(&self, pattern: &EventPattern, handler: &Arc<dyn EventHandler>) -> bool;

    async fn start(&self) -> Result<(), EventBusError>;

    async fn stop(&self) -> ShutdownReport;

    fn is_running(&self) -> bool;

    fn health_check(&self) -> HealthStatus;

    fn metrics(&self) -> BusMetrics;

    fn dead_letters(&self) -> Vec<DeadLetter>;

    /// Returns how many entries were removed
    fn clear_dead_letters(&self) -> usize;

    fn workers(&self) -> Vec<WorkerSnapshot>;
}
