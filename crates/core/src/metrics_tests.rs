// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[test]
fn ema_seeds_with_first_sample() {
    assert_eq!(ema(0.0, 40.0, 0), 40.0);
}

#[test]
fn ema_blends_with_smoothing_factor() {
    let avg = ema(100.0, 200.0, 5);
    assert!((avg - 110.0).abs() < 1e-9);
}

#[test]
fn worker_metrics_count_outcomes_not_attempts() {
    let mut metrics = WorkerMetrics::default();
    let now = Utc::now();

    metrics.record_attempt(10.0);
    metrics.record_attempt(20.0);
    metrics.record_attempt(30.0);
    metrics.record_outcome(true, now);

    assert_eq!(metrics.attempts, 3);
    assert_eq!(metrics.events_processed, 1);
    assert_eq!(metrics.events_failed, 0);
    assert_eq!(metrics.last_processed_at, Some(now));
    // 10 -> 11 -> 12.9
    assert!((metrics.average_processing_time_ms - 12.9).abs() < 1e-9);
}

#[test]
fn failure_rate_is_zero_without_traffic() {
    assert_eq!(BusMetrics::default().failure_rate(), 0.0);
}

#[parameterized(
    idle = { 0, 0, 0, true, HealthStatus::Healthy },
    low_failure_rate = { 100, 10, 0, true, HealthStatus::Healthy },
    high_failure_rate = { 100, 11, 0, true, HealthStatus::Degraded },
    dead_letters_over_limit = { 100, 0, 101, true, HealthStatus::Degraded },
    stopped = { 0, 0, 0, false, HealthStatus::Unhealthy },
)]
fn health_assessment(
    published: u64,
    failed: u64,
    dead_letters: usize,
    running: bool,
    expected: HealthStatus,
) {
    let metrics = BusMetrics {
        events_published: published,
        events_failed: failed,
        dead_letter_queue_size: dead_letters,
        ..BusMetrics::default()
    };
    assert_eq!(
        assess_health(&metrics, running, &HealthConfig::default()),
        expected
    );
}
