// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bus-wide metrics, shared by concurrent delivery tasks

use chrono::{DateTime, Utc};
use rl_core::metrics::ema;
use rl_core::BusMetrics;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

#[derive(Default)]
struct Timing {
    average_ms: f64,
    samples: u64,
}

#[derive(Default)]
pub(crate) struct MetricsRecorder {
    published: AtomicU64,
    processed: AtomicU64,
    failed: AtomicU64,
    timing: Mutex<Timing>,
    last_event: Mutex<Option<DateTime<Utc>>>,
}

impl MetricsRecorder {
    pub(crate) fn record_published(&self, at: DateTime<Utc>) {
        self.published.fetch_add(1, Ordering::Relaxed);
        *self.last_event.lock().unwrap_or_else(|e| e.into_inner()) = Some(at);
    }

    pub(crate) fn record_attempt(&self, processing_time_ms: f64) {
        let mut timing = self.timing.lock().unwrap_or_else(|e| e.into_inner());
        timing.average_ms = ema(timing.average_ms, processing_time_ms, timing.samples);
        timing.samples += 1;
    }

    /// Counted once per (event, target) pair
    pub(crate) fn record_outcome(&self, success: bool) {
        let counter = if success {
            &self.processed
        } else {
            &self.failed
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self, dead_letter_queue_size: usize) -> BusMetrics {
        BusMetrics {
            events_published: self.published.load(Ordering::Relaxed),
            events_processed: self.processed.load(Ordering::Relaxed),
            events_failed: self.failed.load(Ordering::Relaxed),
            average_processing_time_ms: self
                .timing
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .average_ms,
            dead_letter_queue_size,
            last_event_timestamp: *self.last_event.lock().unwrap_or_else(|e| e.into_inner()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_recorded_activity() {
        let metrics = MetricsRecorder::default();
        let at = Utc::now();
        metrics.record_published(at);
        metrics.record_published(at);
        metrics.record_attempt(10.0);
        metrics.record_attempt(20.0);
        metrics.record_outcome(true);
        metrics.record_outcome(false);

        let snapshot = metrics.snapshot(3);
        assert_eq!(snapshot.events_published, 2);
        assert_eq!(snapshot.events_processed, 1);
        assert_eq!(snapshot.events_failed, 1);
        assert!((snapshot.average_processing_time_ms - 11.0).abs() < 1e-9);
        assert_eq!(snapshot.dead_letter_queue_size, 3);
        assert_eq!(snapshot.last_event_timestamp, Some(at));
    }
}
