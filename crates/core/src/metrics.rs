// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Processing metrics and health assessment

use crate::config::HealthConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Smoothing factor for processing-time averages
pub const EMA_SMOOTHING: f64 = 0.1;

/// Fold one sample into an exponential moving average.
///
/// The first sample seeds the average instead of being blended with zero.
pub fn ema(previous: f64, sample: f64, samples_before: u64) -> f64 {
    if samples_before == 0 {
        sample
    } else {
        EMA_SMOOTHING * sample + (1.0 - EMA_SMOOTHING) * previous
    }
}

/// Per-worker counters
///
/// Every handler invocation feeds the timing average; the processed/failed
/// counters move once per delivered event, after its final attempt.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkerMetrics {
    pub events_processed: u64,
    pub events_failed: u64,
    pub attempts: u64,
    pub average_processing_time_ms: f64,
    pub last_processed_at: Option<DateTime<Utc>>,
    pub uptime_seconds: u64,
}

impl WorkerMetrics {
    /// Record the duration of a single handler invocation
    pub fn record_attempt(&mut self, processing_time_ms: f64) {
        self.average_processing_time_ms = ema(
            self.average_processing_time_ms,
            processing_time_ms,
            self.attempts,
        );
        self.attempts += 1;
    }

    /// Record the final outcome of delivering one event
    pub fn record_outcome(&mut self, success: bool, at: DateTime<Utc>) {
        if success {
            self.events_processed += 1;
        } else {
            self.events_failed += 1;
        }
        self.last_processed_at = Some(at);
    }
}

/// Bus-wide counters, as exposed to monitoring
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BusMetrics {
    pub events_published: u64,
    pub events_processed: u64,
    pub events_failed: u64,
    pub average_processing_time_ms: f64,
    pub dead_letter_queue_size: usize,
    pub last_event_timestamp: Option<DateTime<Utc>>,
}

impl BusMetrics {
    /// Failed deliveries relative to published events
    pub fn failure_rate(&self) -> f64 {
        if self.events_published == 0 {
            0.0
        } else {
            self.events_failed as f64 / self.events_published as f64
        }
    }
}

/// Coarse health of a bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Unhealthy => "unhealthy",
        };
        f.write_str(s)
    }
}

/// Derive a health status from a metrics snapshot
pub fn assess_health(metrics: &BusMetrics, running: bool, config: &HealthConfig) -> HealthStatus {
    if !running {
        return HealthStatus::Unhealthy;
    }
    if metrics.failure_rate() > config.max_failure_rate
        || metrics.dead_letter_queue_size > config.max_dead_letters
    {
        return HealthStatus::Degraded;
    }
    HealthStatus::Healthy
}

#[cfg(test)]
#[path = "metrics_tests.rs"]
mod tests;
