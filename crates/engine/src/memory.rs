// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-process event bus
//!
//! `publish` fans out to every matching target and returns only once all of
//! them have settled, so events published one after another are observed in
//! that order by every worker.

use crate::bus::{EventBus, ReplayReport, ShutdownReport};
use crate::dead_letter::DeadLetter;
use crate::dispatch::{Dispatcher, InFlight};
use crate::error::EventBusError;
use crate::registry::{WorkerHandle, WorkerRegistry, WorkerSnapshot};
use crate::store::{EventStore, ReplayFilter};
use crate::subscription::{SubscribeOptions, Subscription};
use async_trait::async_trait;
use rl_core::{
    BusConfig, BusMetrics, Clock, Event, EventHandler, EventPattern, EventWorker,
    ExecutionContext, HealthStatus, SystemClock,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub struct InMemoryEventBus<C: Clock = SystemClock> {
    dispatcher: Arc<Dispatcher<C>>,
    store: EventStore,
    running: AtomicBool,
    in_flight: InFlight,
}

impl InMemoryEventBus<SystemClock> {
    pub fn new(config: BusConfig) -> Self {
        Self::with_clock(config, SystemClock)
    }
}

impl<C: Clock> InMemoryEventBus<C> {
    pub fn with_clock(config: BusConfig, clock: C) -> Self {
        Self {
            store: EventStore::from_config(&config.store),
            dispatcher: Arc::new(Dispatcher::new(config, clock)),
            running: AtomicBool::new(false),
            in_flight: InFlight::default(),
        }
    }

    pub fn registry(&self) -> &Arc<WorkerRegistry<C>> {
        &self.dispatcher.registry
    }

    /// Shorthand for registering with [`Self::registry`]
    pub async fn register_worker(
        &self,
        worker: Arc<dyn EventWorker>,
    ) -> Result<Arc<WorkerHandle<C>>, EventBusError> {
        self.dispatcher.registry.register(worker).await
    }

    pub fn store(&self) -> &EventStore {
        &self.store
    }

    /// Publishes that have not returned yet
    pub fn in_flight(&self) -> usize {
        self.in_flight.count()
    }

    /// Re-publish stored events matching `filter` through the normal
    /// publish path, in their original order.
    ///
    /// Each replay runs under a replay context that keeps the original
    /// correlation id. Stored events are not duplicated by the replay.
    pub async fn replay_events(&self, filter: &ReplayFilter) -> Result<ReplayReport, EventBusError> {
        let stored = self.store.query(filter);
        tracing::info!(count = stored.len(), ?filter, "replaying events");

        let mut report = ReplayReport::default();
        for entry in stored {
            let context = ExecutionContext::replay_of(&entry.context);
            match self.publish(entry.event, None, Some(context)).await {
                Ok(()) => report.replayed += 1,
                Err(EventBusError::Handling(failure)) => {
                    report.replayed += 1;
                    report.failed.push(failure);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(report)
    }
}

#[async_trait]
impl<C: Clock> EventBus for InMemoryEventBus<C> {
    async fn publish(
        &self,
        event: Event,
        routing_key: Option<&str>,
        context: Option<ExecutionContext>,
    ) -> Result<(), EventBusError> {
        let _guard = self.in_flight.enter();
        if !self.running.load(Ordering::SeqCst) {
            return Err(EventBusError::NotRunning);
        }
        event.validate()?;

        let context = context.unwrap_or_default();
        self.dispatcher
            .metrics
            .record_published(self.dispatcher.clock.utc_now());
        self.store.append(&event, &context);
        tracing::debug!(
            event_id = event.event_id(),
            event_type = event.event_type(),
            routing_key,
            correlation_id = context.correlation_id(),
            "event published"
        );

        let workers = self.dispatcher.registry.workers_for(&event);
        let subscriptions = self.dispatcher.subscriptions.matching(&event);
        self.dispatcher
            .dispatch(&event, &context, workers, subscriptions)
            .await
            .map_err(EventBusError::Handling)
    }

    fn subscribe(
        &self,
        pattern: EventPattern,
        handler: Arc<dyn EventHandler>,
        consumer_group: Option<String>,
        options: SubscribeOptions,
    ) {
        self.dispatcher.subscriptions.add(Subscription {
            pattern,
            handler,
            consumer_group,
            options,
        });
    }

    fn unsubscribe(&self, pattern: &EventPattern, handler: &Arc<dyn EventHandler>) -> bool {
        self.dispatcher.subscriptions.remove(pattern, handler)
    }

    async fn start(&self) -> Result<(), EventBusError> {
        if self.running.load(Ordering::SeqCst) {
            return Ok(());
        }
        self.dispatcher.registry.start_all().await;
        self.running.store(true, Ordering::SeqCst);
        tracing::info!(
            workers = self.dispatcher.registry.len(),
            subscriptions = self.dispatcher.subscriptions.len(),
            "event bus started"
        );
        Ok(())
    }

    async fn stop(&self) -> ShutdownReport {
        if !self.running.swap(false, Ordering::SeqCst) {
            return ShutdownReport::default();
        }
        let grace = self.dispatcher.config.shutdown_grace;
        tracing::info!(in_flight = self.in_flight.count(), ?grace, "stopping event bus");

        let drained_cleanly = tokio::time::timeout(grace, self.in_flight.wait_idle())
            .await
            .is_ok();
        if !drained_cleanly {
            tracing::warn!(
                in_flight = self.in_flight.count(),
                "grace period expired, cancelling in-flight deliveries"
            );
            self.dispatcher.cancel.cancel();
            self.in_flight.wait_idle().await;
        }

        self.dispatcher.registry.stop_all().await;
        self.dispatcher.cancel.reset();

        let report = ShutdownReport {
            drained_cleanly,
            cancelled: self.dispatcher.take_cancelled(),
        };
        tracing::info!(
            drained_cleanly = report.drained_cleanly,
            cancelled = report.cancelled,
            "event bus stopped"
        );
        report
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn health_check(&self) -> HealthStatus {
        self.dispatcher.health(self.is_running())
    }

    fn metrics(&self) -> BusMetrics {
        self.dispatcher.bus_metrics()
    }

    fn dead_letters(&self) -> Vec<DeadLetter> {
        self.dispatcher.dead_letters.snapshot()
    }

    fn clear_dead_letters(&self) -> usize {
        self.dispatcher.dead_letters.clear()
    }

    fn workers(&self) -> Vec<WorkerSnapshot> {
        self.dispatcher.registry.snapshots()
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;
