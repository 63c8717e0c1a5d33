// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Delivery of one event to its targets
//!
//! Shared by both bus implementations: fan out one task per target, retry
//! each with backoff, guard workers with their circuit breaker, then settle
//! the outcome into metrics and the dead-letter queue.

use crate::cancel::{CancelSignal, CancelSource};
use crate::dead_letter::{DeadLetter, DeadLetterQueue};
use crate::error::{EventFailure, EventHandlingError, HandlingFailure};
use crate::metrics::MetricsRecorder;
use crate::registry::{WorkerHandle, WorkerRegistry};
use crate::retry::{retry_with_backoff, RetryFailure, RetryPolicy};
use crate::subscription::{Subscription, Subscriptions};
use rl_core::{assess_health, BusConfig, BusMetrics, Clock, Event, ExecutionContext, HealthStatus};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::Instrument;

pub(crate) struct Dispatcher<C: Clock> {
    pub(crate) registry: Arc<WorkerRegistry<C>>,
    pub(crate) subscriptions: Subscriptions,
    pub(crate) dead_letters: DeadLetterQueue,
    pub(crate) metrics: MetricsRecorder,
    pub(crate) config: BusConfig,
    pub(crate) clock: C,
    pub(crate) cancel: CancelSource,
    cancelled: AtomicUsize,
}

impl<C: Clock> Dispatcher<C> {
    pub(crate) fn new(config: BusConfig, clock: C) -> Self {
        Self {
            registry: Arc::new(WorkerRegistry::with_clock(config.breaker.clone(), clock.clone())),
            subscriptions: Subscriptions::default(),
            dead_letters: DeadLetterQueue::from_config(&config.dead_letter),
            metrics: MetricsRecorder::default(),
            config,
            clock,
            cancel: CancelSource::new(),
            cancelled: AtomicUsize::new(0),
        }
    }

    pub(crate) fn bus_metrics(&self) -> BusMetrics {
        self.metrics.snapshot(self.dead_letters.len())
    }

    pub(crate) fn health(&self, running: bool) -> HealthStatus {
        assess_health(&self.bus_metrics(), running, &self.config.health)
    }

    /// Deliveries cancelled since the last call
    pub(crate) fn take_cancelled(&self) -> usize {
        self.cancelled.swap(0, Ordering::SeqCst)
    }

    /// Deliver `event` to every given target concurrently and wait for all.
    pub(crate) async fn dispatch(
        self: &Arc<Self>,
        event: &Event,
        context: &ExecutionContext,
        workers: Vec<Arc<WorkerHandle<C>>>,
        subscriptions: Vec<Subscription>,
    ) -> Result<(), EventFailure> {
        if workers.is_empty() && subscriptions.is_empty() {
            tracing::debug!(
                event_id = event.event_id(),
                event_type = event.event_type(),
                "no targets for event"
            );
            return Ok(());
        }

        let shared_event = Arc::new(event.clone());
        let shared_context = Arc::new(context.clone());
        let mut targets = Vec::with_capacity(workers.len() + subscriptions.len());
        let mut set = JoinSet::new();

        for handle in workers {
            let index = targets.len();
            targets.push(handle.name().to_string());
            let this = Arc::clone(self);
            let event = Arc::clone(&shared_event);
            let context = Arc::clone(&shared_context);
            set.spawn(async move { (index, this.deliver_to_worker(&handle, &event, &context).await) });
        }
        for subscription in subscriptions {
            let index = targets.len();
            targets.push(subscription.handler_name().to_string());
            let this = Arc::clone(self);
            let event = Arc::clone(&shared_event);
            let context = Arc::clone(&shared_context);
            set.spawn(async move {
                (
                    index,
                    this.deliver_to_handler(&subscription, &event, &context).await,
                )
            });
        }

        let mut settled = vec![false; targets.len()];
        let mut failures = Vec::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((index, result)) => {
                    settled[index] = true;
                    if let Err(error) = result {
                        failures.push(error);
                    }
                }
                Err(e) => tracing::error!(event_id = event.event_id(), error = %e, "delivery task failed"),
            }
        }

        // A task that panicked never settled its own outcome
        for (index, target) in targets.into_iter().enumerate() {
            if settled[index] {
                continue;
            }
            let error = EventHandlingError {
                target,
                worker_id: None,
                event_id: event.event_id().to_string(),
                retry_count: 0,
                failure: HandlingFailure::Handler {
                    reason: "delivery task aborted".to_string(),
                },
            };
            failures.push(self.settle_failure(event, context, error, 1, true));
        }

        if failures.is_empty() {
            return Ok(());
        }
        failures.sort_by(|a, b| a.target.cmp(&b.target));
        Err(EventFailure {
            event_id: event.event_id().to_string(),
            failures,
        })
    }

    async fn deliver_to_worker(
        &self,
        handle: &WorkerHandle<C>,
        event: &Event,
        context: &ExecutionContext,
    ) -> Result<(), EventHandlingError> {
        let settings = handle.settings();
        let timeout = settings.processing_timeout;
        let signal = self.cancel.signal();
        let attempt_signal = signal.clone();
        let span = tracing::info_span!(
            "worker.deliver",
            worker = handle.name(),
            event_id = event.event_id(),
            event_type = event.event_type(),
        );

        let result = retry_with_backoff(RetryPolicy::from(&settings), &signal, move |retry| {
            self.worker_attempt(handle, event, context, timeout, attempt_signal.clone(), retry)
        })
        .instrument(span)
        .await;

        match result {
            Ok(retries) => {
                handle.record_outcome(true);
                self.metrics.record_outcome(true);
                if retries > 0 {
                    tracing::info!(worker = handle.name(), event_id = event.event_id(), retries, "delivered after retries");
                }
                Ok(())
            }
            Err(RetryFailure { failure, retries }) => {
                handle.record_outcome(false);
                let error = EventHandlingError {
                    target: handle.name().to_string(),
                    worker_id: Some(handle.worker_id()),
                    event_id: event.event_id().to_string(),
                    retry_count: retries,
                    failure,
                };
                Err(self.settle_failure(
                    event,
                    context,
                    error,
                    retries + 1,
                    self.config.retry.dead_letter_enabled,
                ))
            }
        }
    }

    async fn worker_attempt(
        &self,
        handle: &WorkerHandle<C>,
        event: &Event,
        context: &ExecutionContext,
        timeout: Duration,
        mut cancel: CancelSignal,
        retry: u32,
    ) -> Result<(), HandlingFailure> {
        if !handle.try_acquire() {
            tracing::debug!(worker = handle.name(), "circuit open, worker not invoked");
            return Err(HandlingFailure::CircuitOpen);
        }
        let mut guard = AttemptGuard {
            handle,
            settled: false,
        };

        let started = Instant::now();
        let outcome = tokio::select! {
            result = tokio::time::timeout(timeout, handle.worker().process_event(event, context)) => result,
            _ = cancel.cancelled() => {
                guard.settled = true;
                handle.release_trial();
                return Err(HandlingFailure::Cancelled);
            }
        };
        guard.settled = true;
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        handle.record_attempt(elapsed_ms);
        self.metrics.record_attempt(elapsed_ms);

        let result = match outcome {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(HandlingFailure::from(e)),
            Err(_) => Err(HandlingFailure::Timeout {
                timeout_ms: timeout.as_millis() as u64,
            }),
        };
        match &result {
            Ok(()) => handle.record_success(),
            Err(failure) => {
                handle.record_failure();
                tracing::warn!(worker = handle.name(), retry, elapsed_ms, error = %failure, "delivery attempt failed");
            }
        }
        result
    }

    async fn deliver_to_handler(
        &self,
        subscription: &Subscription,
        event: &Event,
        context: &ExecutionContext,
    ) -> Result<(), EventHandlingError> {
        let options = &subscription.options;
        let signal = self.cancel.signal();
        let attempt_signal = signal.clone();
        let span = tracing::info_span!(
            "handler.deliver",
            handler = subscription.handler_name(),
            event_id = event.event_id(),
            event_type = event.event_type(),
        );

        let result = retry_with_backoff(options.retry_policy(), &signal, move |retry| {
            self.handler_attempt(subscription, event, context, attempt_signal.clone(), retry)
        })
        .instrument(span)
        .await;

        match result {
            Ok(_) => {
                self.metrics.record_outcome(true);
                Ok(())
            }
            Err(RetryFailure { failure, retries }) => {
                let error = EventHandlingError {
                    target: subscription.handler_name().to_string(),
                    worker_id: None,
                    event_id: event.event_id().to_string(),
                    retry_count: retries,
                    failure,
                };
                Err(self.settle_failure(event, context, error, retries + 1, options.dead_letter_enabled))
            }
        }
    }

    async fn handler_attempt(
        &self,
        subscription: &Subscription,
        event: &Event,
        context: &ExecutionContext,
        mut cancel: CancelSignal,
        retry: u32,
    ) -> Result<(), HandlingFailure> {
        let timeout = subscription.options.timeout;
        let started = Instant::now();
        let outcome = tokio::select! {
            result = tokio::time::timeout(timeout, subscription.handler.handle(event, context)) => result,
            _ = cancel.cancelled() => return Err(HandlingFailure::Cancelled),
        };
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        self.metrics.record_attempt(elapsed_ms);

        let result = match outcome {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(HandlingFailure::from(e)),
            Err(_) => Err(HandlingFailure::Timeout {
                timeout_ms: timeout.as_millis() as u64,
            }),
        };
        if let Err(failure) = &result {
            tracing::warn!(handler = subscription.handler_name(), retry, error = %failure, "delivery attempt failed");
        }
        result
    }

    /// Count a failed (event, target) pair and dead-letter it.
    ///
    /// Cancelled deliveries are always dead-lettered so nothing is lost at
    /// shutdown.
    fn settle_failure(
        &self,
        event: &Event,
        context: &ExecutionContext,
        error: EventHandlingError,
        attempts: u32,
        dead_letter_enabled: bool,
    ) -> EventHandlingError {
        self.metrics.record_outcome(false);
        let cancelled = error.failure == HandlingFailure::Cancelled;
        if cancelled {
            self.cancelled.fetch_add(1, Ordering::SeqCst);
        }

        if dead_letter_enabled || cancelled {
            self.dead_letters.push(DeadLetter {
                event: event.clone(),
                context: context.clone(),
                target: error.target.clone(),
                error: error.clone(),
                attempts,
                failed_at: self.clock.utc_now(),
            });
        } else {
            tracing::error!(
                event_id = event.event_id(),
                target = %error.target,
                error = %error.failure,
                "event handling failed"
            );
        }
        error
    }
}

/// Reports an attempt to the breaker when it never ran to completion
///
/// A worker that panics counts as a failure; an attempt dropped mid-flight
/// gives its half-open trial back.
struct AttemptGuard<'a, C: Clock> {
    handle: &'a WorkerHandle<C>,
    settled: bool,
}

impl<C: Clock> Drop for AttemptGuard<'_, C> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        if std::thread::panicking() {
            tracing::error!(worker = self.handle.name(), "worker panicked during delivery");
            self.handle.record_failure();
        } else {
            self.handle.release_trial();
        }
    }
}

/// Tracks publishes that have not returned yet
#[derive(Default)]
pub(crate) struct InFlight {
    count: AtomicUsize,
    idle: Notify,
}

impl InFlight {
    pub(crate) fn enter(&self) -> InFlightGuard<'_> {
        self.count.fetch_add(1, Ordering::SeqCst);
        InFlightGuard { inner: self }
    }

    pub(crate) fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    pub(crate) async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            if self.count() == 0 {
                return;
            }
            notified.await;
        }
    }
}

pub(crate) struct InFlightGuard<'a> {
    inner: &'a InFlight,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if self.inner.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.inner.idle.notify_waiters();
        }
    }
}
