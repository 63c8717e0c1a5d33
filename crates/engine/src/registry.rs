// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker registry
//!
//! Each registered worker gets its own lifecycle state, metrics and circuit
//! breaker. None of these are shared between workers.

use crate::error::EventBusError;
use rl_core::{
    BreakerConfig, BreakerSnapshot, BreakerState, CircuitBreaker, Clock, Event, EventWorker,
    IdGen, SystemClock, UuidIdGen, WorkerMetrics, WorkerSettings, WorkerState, WorkerStatus,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use tokio::task::JoinSet;

/// Read-only view of a worker for monitoring
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerSnapshot {
    pub worker_id: String,
    pub worker_name: String,
    pub status: WorkerStatus,
    pub last_error: Option<String>,
    pub metrics: WorkerMetrics,
    pub breaker: BreakerSnapshot,
}

/// A registered worker with its lifecycle state and circuit breaker
pub struct WorkerHandle<C: Clock = SystemClock> {
    worker: Arc<dyn EventWorker>,
    state: Mutex<WorkerState>,
    breaker: Mutex<CircuitBreaker>,
    clock: C,
}

impl<C: Clock> WorkerHandle<C> {
    fn new(worker_id: String, worker: Arc<dyn EventWorker>, breaker: CircuitBreaker, clock: C) -> Self {
        let state = WorkerState::new(worker_id, worker.worker_name());
        Self {
            worker,
            state: Mutex::new(state),
            breaker: Mutex::new(breaker),
            clock,
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, WorkerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_breaker(&self) -> MutexGuard<'_, CircuitBreaker> {
        self.breaker.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn name(&self) -> &str {
        self.worker.worker_name()
    }

    pub fn worker_id(&self) -> String {
        self.lock_state().worker_id.clone()
    }

    pub fn worker(&self) -> &dyn EventWorker {
        self.worker.as_ref()
    }

    pub fn status(&self) -> WorkerStatus {
        self.lock_state().status()
    }

    pub fn is_running(&self) -> bool {
        self.lock_state().is_running()
    }

    pub fn settings(&self) -> WorkerSettings {
        self.worker.settings()
    }

    /// Consumer group name, defaulting to the worker name
    pub fn consumer_group(&self) -> String {
        self.worker
            .consumer_group()
            .unwrap_or_else(|| self.worker.worker_name())
            .to_string()
    }

    /// Drive Stopped -> Starting -> Running (or Error). No-op unless Stopped.
    ///
    /// Returns true if the worker ended up running.
    pub async fn start(&self) -> bool {
        if !self.lock_state().begin_start() {
            return self.is_running();
        }

        let result = self.worker.initialize().await.map_err(|e| e.to_string());
        match &result {
            Ok(()) => tracing::info!(worker = self.name(), "worker started"),
            Err(reason) => {
                tracing::error!(worker = self.name(), error = %reason, "worker failed to initialize")
            }
        }
        let ok = result.is_ok();
        self.lock_state().finish_start(result, &self.clock);
        ok
    }

    /// Drive Running -> Stopping -> Stopped (or Error). No-op unless Running.
    pub async fn stop(&self) {
        if !self.lock_state().begin_stop() {
            return;
        }

        let result = self.worker.cleanup().await.map_err(|e| e.to_string());
        match &result {
            Ok(()) => tracing::info!(worker = self.name(), "worker stopped"),
            Err(reason) => {
                tracing::error!(worker = self.name(), error = %reason, "worker cleanup failed")
            }
        }
        self.lock_state().finish_stop(result);
    }

    pub fn try_acquire(&self) -> bool {
        self.lock_breaker().try_acquire(&self.clock)
    }

    pub fn record_success(&self) {
        self.lock_breaker().record_success();
    }

    pub fn record_failure(&self) {
        let mut breaker = self.lock_breaker();
        let was = breaker.state();
        breaker.record_failure(&self.clock);
        if was != BreakerState::Open && breaker.state() == BreakerState::Open {
            tracing::warn!(
                worker = self.name(),
                failures = breaker.failure_count(),
                "circuit opened"
            );
        }
    }

    /// Give back a half-open trial that never reached an outcome
    pub fn release_trial(&self) {
        self.lock_breaker().release_trial();
    }

    pub fn record_attempt(&self, processing_time_ms: f64) {
        self.lock_state().record_attempt(processing_time_ms);
    }

    pub fn record_outcome(&self, success: bool) {
        let at = self.clock.utc_now();
        self.lock_state().record_outcome(success, at);
    }

    pub fn breaker(&self) -> BreakerSnapshot {
        self.lock_breaker().snapshot()
    }

    pub fn metrics(&self) -> WorkerMetrics {
        self.lock_state().metrics(&self.clock)
    }

    pub fn snapshot(&self) -> WorkerSnapshot {
        let (worker_id, status, last_error, metrics) = {
            let state = self.lock_state();
            (
                state.worker_id.clone(),
                state.status(),
                state.last_error().map(str::to_string),
                state.metrics(&self.clock),
            )
        };
        WorkerSnapshot {
            worker_id,
            worker_name: self.name().to_string(),
            status,
            last_error,
            metrics,
            breaker: self.breaker(),
        }
    }
}

/// Owns the set of registered workers
pub struct WorkerRegistry<C: Clock = SystemClock> {
    workers: RwLock<BTreeMap<String, Arc<WorkerHandle<C>>>>,
    running: AtomicBool,
    breaker: BreakerConfig,
    clock: C,
}

impl WorkerRegistry<SystemClock> {
    pub fn new(breaker: BreakerConfig) -> Self {
        Self::with_clock(breaker, SystemClock)
    }
}

impl<C: Clock> WorkerRegistry<C> {
    pub fn with_clock(breaker: BreakerConfig, clock: C) -> Self {
        Self {
            workers: RwLock::new(BTreeMap::new()),
            running: AtomicBool::new(false),
            breaker,
            clock,
        }
    }

    fn handles(&self) -> Vec<Arc<WorkerHandle<C>>> {
        self.workers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect()
    }

    /// Register a worker under its name.
    ///
    /// If the registry has already been started the worker is started
    /// before this returns.
    pub async fn register(
        &self,
        worker: Arc<dyn EventWorker>,
    ) -> Result<Arc<WorkerHandle<C>>, EventBusError> {
        let name = worker.worker_name().to_string();
        let handle = Arc::new(WorkerHandle::new(
            UuidIdGen.next(),
            worker,
            CircuitBreaker::from_config(&self.breaker),
            self.clock.clone(),
        ));

        {
            let mut workers = self.workers.write().unwrap_or_else(|e| e.into_inner());
            if workers.contains_key(&name) {
                return Err(EventBusError::DuplicateWorker(name));
            }
            workers.insert(name.clone(), Arc::clone(&handle));
        }
        tracing::info!(worker = %name, "worker registered");

        if self.running.load(Ordering::SeqCst) {
            handle.start().await;
        }
        Ok(handle)
    }

    /// Remove a worker, stopping it first. Returns false if unknown.
    pub async fn unregister(&self, worker_name: &str) -> bool {
        let removed = self
            .workers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(worker_name);
        match removed {
            Some(handle) => {
                handle.stop().await;
                tracing::info!(worker = worker_name, "worker unregistered");
                true
            }
            None => false,
        }
    }

    pub fn get(&self, worker_name: &str) -> Option<Arc<WorkerHandle<C>>> {
        self.workers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(worker_name)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.workers.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Start every worker concurrently and wait for all of them
    pub async fn start_all(&self) {
        self.running.store(true, Ordering::SeqCst);
        let mut set = JoinSet::new();
        for handle in self.handles() {
            set.spawn(async move { handle.start().await });
        }
        let mut started = 0;
        while let Some(result) = set.join_next().await {
            match result {
                Ok(true) => started += 1,
                Ok(false) => {}
                Err(e) => tracing::error!(error = %e, "worker start task failed"),
            }
        }
        tracing::info!(started, total = self.len(), "workers started");
    }

    /// Stop every worker concurrently, running each worker's cleanup
    pub async fn stop_all(&self) {
        self.running.store(false, Ordering::SeqCst);
        let mut set = JoinSet::new();
        for handle in self.handles() {
            set.spawn(async move { handle.stop().await });
        }
        while let Some(result) = set.join_next().await {
            if let Err(e) = result {
                tracing::error!(error = %e, "worker stop task failed");
            }
        }
    }

    /// Running workers whose capability predicate accepts the event
    pub fn workers_for(&self, event: &Event) -> Vec<Arc<WorkerHandle<C>>> {
        self.handles()
            .into_iter()
            .filter(|h| h.is_running() && h.worker().can_handle(event))
            .collect()
    }

    /// All running workers
    pub fn running(&self) -> Vec<Arc<WorkerHandle<C>>> {
        self.handles().into_iter().filter(|h| h.is_running()).collect()
    }

    pub fn snapshots(&self) -> Vec<WorkerSnapshot> {
        self.handles().iter().map(|h| h.snapshot()).collect()
    }

    /// Circuit breaker state of every worker, keyed by worker name
    pub fn breaker_states(&self) -> BTreeMap<String, BreakerSnapshot> {
        self.handles()
            .iter()
            .map(|h| (h.name().to_string(), h.breaker()))
            .collect()
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
