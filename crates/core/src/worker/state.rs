// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker lifecycle state machine

use crate::clock::Clock;
use crate::metrics::WorkerMetrics;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};

/// Worker status
///
/// `Stopped -> Starting -> Running -> Stopping -> Stopped`, with `Error`
/// reachable when initialization or cleanup fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    Starting,
    Running,
    Stopping,
    Stopped,
    Error,
}

impl fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WorkerStatus::Starting => "starting",
            WorkerStatus::Running => "running",
            WorkerStatus::Stopping => "stopping",
            WorkerStatus::Stopped => "stopped",
            WorkerStatus::Error => "error",
        };
        f.write_str(s)
    }
}

/// Lifecycle and counters for one registered worker
#[derive(Debug, Clone)]
pub struct WorkerState {
    pub worker_id: String,
    pub worker_name: String,
    status: WorkerStatus,
    started_at: Option<Instant>,
    last_error: Option<String>,
    metrics: WorkerMetrics,
}

impl WorkerState {
    pub fn new(worker_id: impl Into<String>, worker_name: impl Into<String>) -> Self {
        Self {
            worker_id: worker_id.into(),
            worker_name: worker_name.into(),
            status: WorkerStatus::Stopped,
            started_at: None,
            last_error: None,
            metrics: WorkerMetrics::default(),
        }
    }

    pub fn status(&self) -> WorkerStatus {
        self.status
    }

    pub fn is_running(&self) -> bool {
        self.status == WorkerStatus::Running
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Enter `Starting`. Returns false, leaving the state alone, unless stopped.
    pub fn begin_start(&mut self) -> bool {
        if self.status != WorkerStatus::Stopped {
            return false;
        }
        self.status = WorkerStatus::Starting;
        true
    }

    /// Complete a start begun with [`begin_start`](Self::begin_start)
    pub fn finish_start(&mut self, result: Result<(), String>, clock: &impl Clock) {
        match result {
            Ok(()) => {
                self.status = WorkerStatus::Running;
                self.started_at = Some(clock.now());
                self.last_error = None;
            }
            Err(reason) => {
                self.status = WorkerStatus::Error;
                self.last_error = Some(reason);
            }
        }
    }

    /// Enter `Stopping`. Returns false, leaving the state alone, unless running.
    pub fn begin_stop(&mut self) -> bool {
        if self.status != WorkerStatus::Running {
            return false;
        }
        self.status = WorkerStatus::Stopping;
        true
    }

    /// Complete a stop begun with [`begin_stop`](Self::begin_stop)
    pub fn finish_stop(&mut self, result: Result<(), String>) {
        self.started_at = None;
        match result {
            Ok(()) => self.status = WorkerStatus::Stopped,
            Err(reason) => {
                self.status = WorkerStatus::Error;
                self.last_error = Some(reason);
            }
        }
    }

    pub fn record_attempt(&mut self, processing_time_ms: f64) {
        self.metrics.record_attempt(processing_time_ms);
    }

    pub fn record_outcome(&mut self, success: bool, at: DateTime<Utc>) {
        self.metrics.record_outcome(success, at);
    }

    /// Time since the last successful start; zero when not running
    pub fn uptime(&self, clock: &impl Clock) -> Duration {
        self.started_at
            .map(|at| clock.now().saturating_duration_since(at))
            .unwrap_or_default()
    }

    /// Metrics snapshot with uptime filled in
    pub fn metrics(&self, clock: &impl Clock) -> WorkerMetrics {
        WorkerMetrics {
            uptime_seconds: self.uptime(clock).as_secs(),
            ..self.metrics.clone()
        }
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
