// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Stream-backed event bus
//!
//! `publish` appends to a durable stream and returns once the entry is
//! written. Each worker's consumer group reads the stream in its own task,
//! so several bus instances sharing a stream split the work of a group
//! between them and each entry is handled once per group.
//!
//! Delivery guarantee: an entry is acknowledged after its targets settle,
//! whether they succeeded or not. Failures never block the rest of the
//! stream; they are counted in `events_failed` and kept in the dead-letter
//! queue. Publishers do not see handler failures.
//!
//! Entries read but never acknowledged are taken over by another consumer
//! of the group once they have been pending for the claim idle time, which
//! defaults to the longest a delivery can take under the bus retry policy.
//! A delivery that outlives it may run twice.

use crate::bus::{EventBus, ShutdownReport};
use crate::cancel::{CancelSignal, CancelSource};
use crate::dead_letter::DeadLetter;
use crate::dispatch::{Dispatcher, InFlight};
use crate::error::EventBusError;
use crate::registry::{WorkerHandle, WorkerRegistry, WorkerSnapshot};
use crate::subscription::{SubscribeOptions, Subscription};
use async_trait::async_trait;
use rl_core::{
    BusConfig, BusMetrics, Clock, Event, EventHandler, EventPattern, EventWorker,
    ExecutionContext, HealthStatus, IdGen, SystemClock, UuidIdGen,
};
use rl_storage::{EventStream, StartPosition, StreamEntry, StreamError, StreamRecord};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::Instrument;

const DEFAULT_BATCH_SIZE: usize = 100;

/// Floor for the reclaim poll so a zero claim idle time cannot spin
const MIN_CLAIM_POLL: Duration = Duration::from_millis(10);

/// Worst case for one delivery: every attempt times out, plus the backoff
fn default_claim_idle(config: &BusConfig) -> Duration {
    let retries = config.retry.max_retries;
    let backoff_units = 2u32.saturating_pow(retries).saturating_sub(1);
    config
        .processing_timeout
        .saturating_mul(retries.saturating_add(1))
        .saturating_add(config.retry.retry_delay.saturating_mul(backoff_units))
}

fn now_micros<C: Clock>(clock: &C) -> u64 {
    u64::try_from(clock.utc_now().timestamp_micros()).unwrap_or(0)
}

/// A stream shared by every bus instance in the process
#[derive(Clone)]
pub struct SharedStream {
    inner: Arc<Mutex<EventStream>>,
    appended: Arc<Notify>,
    progress: Arc<Notify>,
}

impl SharedStream {
    pub fn new(stream: EventStream) -> Self {
        Self {
            inner: Arc::new(Mutex::new(stream)),
            appended: Arc::new(Notify::new()),
            progress: Arc::new(Notify::new()),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(EventStream::in_memory())
    }

    pub fn open(path: &Path) -> Result<Self, StreamError> {
        Ok(Self::new(EventStream::open(path)?))
    }

    fn lock(&self) -> MutexGuard<'_, EventStream> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn append(&self, record: StreamRecord) -> Result<u64, StreamError> {
        let id = self.lock().append(record)?;
        self.appended.notify_waiters();
        Ok(id)
    }

    /// Up to `count` entries starting at id `from`
    pub fn range(&self, from: u64, count: usize) -> Vec<StreamEntry> {
        self.lock().range(from, count)
    }

    pub fn create_group(&self, group: &str, start: StartPosition) -> Result<bool, StreamError> {
        self.lock().create_group(group, start)
    }

    /// `now_micros` is recorded as the delivery time of every entry read
    pub fn read_group(
        &self,
        group: &str,
        consumer: &str,
        count: usize,
        now_micros: u64,
    ) -> Result<Vec<StreamEntry>, StreamError> {
        self.lock().read_group(group, consumer, count, now_micros)
    }

    /// Pending entries owned by `consumer` or idle for at least `min_idle`
    pub fn claim_pending(
        &self,
        group: &str,
        consumer: &str,
        min_idle: Duration,
        now_micros: u64,
    ) -> Result<Vec<StreamEntry>, StreamError> {
        self.lock().claim_pending(group, consumer, min_idle, now_micros)
    }

    pub fn ack(&self, group: &str, ids: &[u64]) -> Result<usize, StreamError> {
        let acked = self.lock().ack(group, ids)?;
        self.progress.notify_waiters();
        Ok(acked)
    }

    pub fn status(&self, group: &str) -> Result<GroupStatus, StreamError> {
        let stream = self.lock();
        Ok(GroupStatus {
            group: group.to_string(),
            lag: stream.lag(group)?,
            pending: stream.pending(group)?,
        })
    }
}

/// Backlog of one consumer group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupStatus {
    pub group: String,
    /// Entries not yet read by any consumer of the group
    pub lag: u64,
    /// Entries read but not yet acknowledged
    pub pending: usize,
}

impl GroupStatus {
    pub fn is_idle(&self) -> bool {
        self.lag == 0 && self.pending == 0
    }
}

pub struct StreamEventBus<C: Clock = SystemClock> {
    dispatcher: Arc<Dispatcher<C>>,
    stream: SharedStream,
    consumer: String,
    batch_size: usize,
    claim_idle: Duration,
    running: AtomicBool,
    in_flight: InFlight,
    shutdown: CancelSource,
    consumers: Mutex<BTreeMap<String, JoinHandle<()>>>,
}

impl StreamEventBus<SystemClock> {
    pub fn new(stream: SharedStream, config: BusConfig) -> Self {
        Self::with_clock(stream, config, SystemClock)
    }
}

impl<C: Clock> StreamEventBus<C> {
    pub fn with_clock(stream: SharedStream, config: BusConfig, clock: C) -> Self {
        Self {
            claim_idle: default_claim_idle(&config),
            dispatcher: Arc::new(Dispatcher::new(config, clock)),
            stream,
            consumer: format!("consumer-{}", UuidIdGen.next()),
            batch_size: DEFAULT_BATCH_SIZE,
            running: AtomicBool::new(false),
            in_flight: InFlight::default(),
            shutdown: CancelSource::new(),
            consumers: Mutex::new(BTreeMap::new()),
        }
    }

    /// Name this instance uses inside every consumer group
    pub fn with_consumer_name(mut self, consumer: impl Into<String>) -> Self {
        self.consumer = consumer.into();
        self
    }

    /// Entries read from the stream per poll
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// How long an entry stays pending with another consumer before this
    /// instance takes it over
    pub fn with_claim_idle(mut self, claim_idle: Duration) -> Self {
        self.claim_idle = claim_idle;
        self
    }

    pub fn consumer_name(&self) -> &str {
        &self.consumer
    }

    pub fn stream(&self) -> &SharedStream {
        &self.stream
    }

    pub fn registry(&self) -> &Arc<WorkerRegistry<C>> {
        &self.dispatcher.registry
    }

    /// Register a worker and, if the bus is running, start consuming its group
    pub async fn register_worker(
        &self,
        worker: Arc<dyn EventWorker>,
    ) -> Result<Arc<WorkerHandle<C>>, EventBusError> {
        let handle = self.dispatcher.registry.register(worker).await?;
        if self.is_running() {
            self.ensure_consumers()?;
        }
        Ok(handle)
    }

    /// Backlog of every group this instance consumes
    pub fn group_status(&self) -> Result<Vec<GroupStatus>, EventBusError> {
        let groups: Vec<String> = self.lock_consumers().keys().cloned().collect();
        groups
            .iter()
            .map(|g| self.stream.status(g).map_err(EventBusError::from))
            .collect()
    }

    /// Wait until every consumed group has nothing unread or unacknowledged
    pub async fn wait_idle(&self) -> Result<(), EventBusError> {
        loop {
            let progressed = self.stream.progress.notified();
            if self.group_status()?.iter().all(GroupStatus::is_idle) {
                return Ok(());
            }
            progressed.await;
        }
    }

    fn lock_consumers(&self) -> MutexGuard<'_, BTreeMap<String, JoinHandle<()>>> {
        self.consumers.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Spawn a consumer loop for every group that does not have one yet
    fn ensure_consumers(&self) -> Result<(), EventBusError> {
        let mut groups: BTreeSet<String> = self
            .dispatcher
            .registry
            .running()
            .iter()
            .map(|h| h.consumer_group())
            .collect();
        groups.extend(self.dispatcher.subscriptions.groups());

        let mut consumers = self.lock_consumers();
        for group in groups {
            if consumers.contains_key(&group) {
                continue;
            }
            if self.stream.create_group(&group, StartPosition::Latest)? {
                tracing::info!(group = %group, "consumer group created");
            }
            let task = tokio::spawn(consume(
                Arc::clone(&self.dispatcher),
                self.stream.clone(),
                group.clone(),
                self.consumer.clone(),
                self.batch_size,
                self.claim_idle,
                self.shutdown.signal(),
            ));
            consumers.insert(group, task);
        }
        Ok(())
    }
}

async fn consume<C: Clock>(
    dispatcher: Arc<Dispatcher<C>>,
    stream: SharedStream,
    group: String,
    consumer: String,
    batch_size: usize,
    claim_idle: Duration,
    mut shutdown: CancelSignal,
) {
    let span = tracing::info_span!("stream.consume", group = %group, consumer = %consumer);
    async move {
        loop {
            let appended = stream.appended.notified();
            let now = now_micros(&dispatcher.clock);

            // Entries a stopped or crashed consumer read but never acknowledged
            let claimed = match stream.claim_pending(&group, &consumer, claim_idle, now) {
                Ok(claimed) => claimed,
                Err(e) => {
                    tracing::error!(error = %e, "claiming pending entries failed");
                    return;
                }
            };
            let batch = if claimed.is_empty() {
                match stream.read_group(&group, &consumer, batch_size, now) {
                    Ok(batch) => batch,
                    Err(e) => {
                        tracing::error!(error = %e, "reading from stream failed");
                        return;
                    }
                }
            } else {
                tracing::info!(count = claimed.len(), "redelivering unacknowledged entries");
                claimed
            };

            if batch.is_empty() {
                tokio::select! {
                    _ = appended => continue,
                    _ = tokio::time::sleep(claim_idle.max(MIN_CLAIM_POLL)) => continue,
                    _ = shutdown.cancelled() => return,
                }
            }

            for entry in batch {
                // Unhandled entries stay pending and are claimed on the next start
                if shutdown.is_cancelled() {
                    return;
                }
                handle_entry(&dispatcher, &stream, &group, entry).await;
            }
        }
    }
    .instrument(span)
    .await
}

async fn handle_entry<C: Clock>(
    dispatcher: &Arc<Dispatcher<C>>,
    stream: &SharedStream,
    group: &str,
    entry: StreamEntry,
) {
    let entry_id = entry.id;
    let StreamRecord { event, context, .. } = entry.record;

    let workers = dispatcher
        .registry
        .workers_for(&event)
        .into_iter()
        .filter(|h| h.consumer_group() == group)
        .collect();
    let subscriptions = dispatcher
        .subscriptions
        .matching(&event)
        .into_iter()
        .filter(|s| s.group() == group)
        .collect();

    let result = dispatcher
        .dispatch(&event, &context, workers, subscriptions)
        .await;

    if let Err(e) = stream.ack(group, &[entry_id]) {
        tracing::error!(entry_id, error = %e, "acknowledging entry failed");
    }
    if let Err(failure) = result {
        tracing::warn!(
            entry_id,
            event_id = event.event_id(),
            failed_targets = failure.failures.len(),
            "entry acknowledged after failed delivery"
        );
    }
}

#[async_trait]
impl<C: Clock> EventBus for StreamEventBus<C> {
    /// Append the event to the stream. Delivery happens in the background,
    /// so handler failures are not returned here.
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
        self.ensure_consumers()?;

        let event_id = event.event_id().to_string();
        let record = StreamRecord {
            event,
            context: context.unwrap_or_default(),
            routing_key: routing_key.map(str::to_string),
        };
        let entry_id = self.stream.append(record)?;
        self.dispatcher
            .metrics
            .record_published(self.dispatcher.clock.utc_now());
        tracing::debug!(entry_id, event_id = %event_id, routing_key, "event appended to stream");
        Ok(())
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
        if self.is_running() {
            if let Err(e) = self.ensure_consumers() {
                tracing::error!(error = %e, "starting consumer for subscription failed");
            }
        }
    }

    fn unsubscribe(&self, pattern: &EventPattern, handler: &Arc<dyn EventHandler>) -> bool {
        self.dispatcher.subscriptions.remove(pattern, handler)
    }

    async fn start(&self) -> Result<(), EventBusError> {
        if self.running.load(Ordering::SeqCst) {
            return Ok(());
        }
        self.dispatcher.registry.start_all().await;
        self.ensure_consumers()?;
        self.running.store(true, Ordering::SeqCst);
        tracing::info!(
            consumer = %self.consumer,
            groups = self.lock_consumers().len(),
            "stream event bus started"
        );
        Ok(())
    }

    async fn stop(&self) -> ShutdownReport {
        if !self.running.swap(false, Ordering::SeqCst) {
            return ShutdownReport::default();
        }
        self.in_flight.wait_idle().await;

        let grace = self.dispatcher.config.shutdown_grace;
        let drained_cleanly = matches!(
            tokio::time::timeout(grace, self.wait_idle()).await,
            Ok(Ok(()))
        );
        if !drained_cleanly {
            tracing::warn!("grace period expired, cancelling in-flight deliveries");
            self.dispatcher.cancel.cancel();
        }

        self.shutdown.cancel();
        let consumers: Vec<(String, JoinHandle<()>)> =
            std::mem::take(&mut *self.lock_consumers()).into_iter().collect();
        for (group, task) in consumers {
            if let Err(e) = task.await {
                tracing::error!(group = %group, error = %e, "consumer task failed");
            }
            match self.stream.status(&group) {
                Ok(status) if !status.is_idle() => tracing::warn!(
                    group = %group,
                    unread = status.lag,
                    pending = status.pending,
                    "entries left on stream for the next start"
                ),
                Ok(_) => {}
                Err(e) => tracing::error!(group = %group, error = %e, "reading group status failed"),
            }
        }

        self.dispatcher.registry.stop_all().await;
        self.dispatcher.cancel.reset();
        self.shutdown.reset();

        let report = ShutdownReport {
            drained_cleanly,
            cancelled: self.dispatcher.take_cancelled(),
        };
        tracing::info!(
            drained_cleanly = report.drained_cleanly,
            cancelled = report.cancelled,
            "stream event bus stopped"
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
#[path = "stream_tests.rs"]
mod tests;
