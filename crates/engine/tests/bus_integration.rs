// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end delivery behavior through the public bus API

use async_trait::async_trait;
use rl_adapters::{FakeNotifyAdapter, FakeReportSink, NotifyUrgency};
use rl_audit::{AuditLogChain, AuditLogger, ChainKey, MemoryAuditStore};
use rl_core::{
    event_types, BreakerConfig, BreakerState, BusConfig, Event, EventPayload, EventWorker,
    ExecutionContext, FakeClock, HandlerError, HealthStatus, OperationType, RetryConfig, Severity,
    TradeSide, WorkerSettings,
};
use rl_engine::{
    AuditTrailWorker, EventBus, HandlingFailure, InMemoryEventBus, NotificationWorker,
    ReportingWorker, RiskAlertWorker, SharedStream, StreamEventBus,
};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

const AUDIT_SECRET: &[u8] = b"integration-audit-key-abcdefghijklmn";

fn breach(id: &str, severity: Severity) -> Event {
    Event::new(
        "acct-1",
        EventPayload::RiskLimitBreached {
            account_id: "acct-1".to_string(),
            limit: "daily_loss".to_string(),
            current_value: 1200.0,
            limit_value: 1000.0,
            severity,
        },
    )
    .with_id(id)
}

fn trade(id: &str) -> Event {
    Event::new(
        "acct-1",
        EventPayload::TradeExecuted {
            account_id: "acct-1".to_string(),
            symbol: "XAUUSD".to_string(),
            side: TradeSide::Buy,
            quantity: 1.0,
            price: 2400.0,
        },
    )
    .with_id(id)
}

/// Fails the first `fail_first` calls and records when each call happened
struct FlakyWorker {
    fail_first: u32,
    calls: AtomicU32,
    call_times: Mutex<Vec<Instant>>,
    max_retries: u32,
    retry_delay: Duration,
}

impl FlakyWorker {
    fn new(fail_first: u32, max_retries: u32, retry_delay: Duration) -> Self {
        Self {
            fail_first,
            calls: AtomicU32::new(0),
            call_times: Mutex::new(Vec::new()),
            max_retries,
            retry_delay,
        }
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    fn gaps(&self) -> Vec<Duration> {
        let times = self.call_times.lock().unwrap();
        times.windows(2).map(|w| w[1] - w[0]).collect()
    }
}

#[async_trait]
impl EventWorker for FlakyWorker {
    fn worker_name(&self) -> &str {
        "flaky"
    }

    fn handled_event_types(&self) -> &[&str] {
        &[event_types::RISK_LIMIT_BREACHED, event_types::TRADE_EXECUTED]
    }

    fn settings(&self) -> WorkerSettings {
        WorkerSettings {
            max_retries: self.max_retries,
            retry_delay: self.retry_delay,
            ..WorkerSettings::default()
        }
    }

    async fn process_event(&self, _: &Event, _: &ExecutionContext) -> Result<(), HandlerError> {
        self.call_times.lock().unwrap().push(Instant::now());
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.fail_first {
            Err(HandlerError::failed(format!("attempt {} refused", call + 1)))
        } else {
            Ok(())
        }
    }
}

async fn bus_with(worker: Arc<dyn EventWorker>) -> InMemoryEventBus {
    let bus = InMemoryEventBus::new(BusConfig::default());
    bus.register_worker(worker).await.unwrap();
    bus.start().await.unwrap();
    bus
}

#[tokio::test]
async fn critical_breach_is_processed_and_bus_stays_healthy() {
    let notifier = FakeNotifyAdapter::new();
    let bus = bus_with(Arc::new(RiskAlertWorker::new(notifier.clone()))).await;

    bus.publish(breach("b1", Severity::Critical), None, None)
        .await
        .unwrap();

    let worker = &bus.workers()[0];
    assert_eq!(worker.metrics.events_processed, 1);
    assert_eq!(worker.metrics.events_failed, 0);
    assert_eq!(bus.health_check(), HealthStatus::Healthy);
    assert_eq!(notifier.sent()[0].urgency, NotifyUrgency::Critical);
}

#[tokio::test(start_paused = true)]
async fn two_failures_then_success_stays_out_of_the_dead_letter_queue() {
    let worker = Arc::new(FlakyWorker::new(2, 3, Duration::from_secs(1)));
    let bus = bus_with(worker.clone()).await;

    bus.publish(breach("b1", Severity::Critical), None, None)
        .await
        .unwrap();

    assert_eq!(worker.calls(), 3);
    let metrics = &bus.workers()[0].metrics;
    assert_eq!(metrics.events_processed, 1);
    assert_eq!(metrics.events_failed, 0);
    assert!(bus.dead_letters().is_empty());
}

#[tokio::test(start_paused = true)]
async fn exhausted_retry_budget_backs_off_exponentially() {
    let worker = Arc::new(FlakyWorker::new(u32::MAX, 3, Duration::from_secs(1)));
    let bus = bus_with(worker.clone()).await;

    let err = bus
        .publish(breach("b1", Severity::High), None, None)
        .await
        .unwrap_err();

    assert_eq!(worker.calls(), 4);
    assert_eq!(
        worker.gaps(),
        [1, 2, 4].map(Duration::from_secs).to_vec()
    );
    let failure = &err.failures()[0].failures[0];
    assert_eq!(failure.retry_count, 3);
    assert_eq!(
        failure.failure,
        HandlingFailure::Handler {
            reason: "attempt 4 refused".to_string()
        }
    );
}

#[tokio::test]
async fn every_exhausted_event_is_dead_lettered_exactly_once() {
    let bus = InMemoryEventBus::new(BusConfig {
        breaker: BreakerConfig {
            failure_threshold: 100,
            ..BreakerConfig::default()
        },
        ..BusConfig::default()
    });
    let worker = Arc::new(FlakyWorker::new(u32::MAX, 1, Duration::from_millis(1)));
    bus.register_worker(worker).await.unwrap();
    bus.start().await.unwrap();

    let events: Vec<Event> = (0..5).map(|n| trade(&format!("t{n}"))).collect();
    let err = bus.publish_batch(events, None).await.unwrap_err();
    assert_eq!(err.failures().len(), 5);

    let letters = bus.dead_letters();
    let mut ids: Vec<&str> = letters.iter().map(|d| d.event.event_id()).collect();
    ids.sort_unstable();
    assert_eq!(ids, ["t0", "t1", "t2", "t3", "t4"]);
    assert!(letters.iter().all(|d| d.attempts == 2 && d.target == "flaky"));
    assert_eq!(bus.metrics().dead_letter_queue_size, 5);
}

#[tokio::test]
async fn breaker_rejects_without_invoking_until_recovery() {
    let clock = FakeClock::new();
    let bus = InMemoryEventBus::with_clock(
        BusConfig {
            breaker: BreakerConfig {
                failure_threshold: 3,
                recovery_timeout: Duration::from_secs(60),
            },
            ..BusConfig::default()
        },
        clock.clone(),
    );
    let worker = Arc::new(FlakyWorker::new(3, 0, Duration::ZERO));
    bus.register_worker(worker.clone()).await.unwrap();
    bus.start().await.unwrap();

    for n in 0..3 {
        assert!(bus.publish(trade(&format!("t{n}")), None, None).await.is_err());
    }
    assert_eq!(bus.workers()[0].breaker.state, BreakerState::Open);

    clock.advance(Duration::from_secs(59));
    let err = bus.publish(trade("t3"), None, None).await.unwrap_err();
    assert!(err.failures()[0].failures[0].is_circuit_open());
    assert_eq!(worker.calls(), 3);

    clock.advance(Duration::from_secs(1));
    bus.publish(trade("t4"), None, None).await.unwrap();
    assert_eq!(worker.calls(), 4);
    assert_eq!(bus.workers()[0].breaker.state, BreakerState::Closed);
}

#[tokio::test(start_paused = true)]
async fn breaker_opening_mid_retry_reports_the_handler_failure() {
    let worker = Arc::new(FlakyWorker::new(u32::MAX, 5, Duration::from_millis(10)));
    let bus = bus_with(worker.clone()).await;

    let err = bus
        .publish(breach("b1", Severity::High), None, None)
        .await
        .unwrap_err();

    // The default breaker opens on the fifth failure and rejects the sixth call
    assert_eq!(worker.calls(), 5);
    let refused = HandlingFailure::Handler {
        reason: "attempt 5 refused".to_string(),
    };
    let failure = &err.failures()[0].failures[0];
    assert_eq!(failure.failure, refused);
    assert_eq!(failure.retry_count, 4);

    let letters = bus.dead_letters();
    assert_eq!(letters.len(), 1);
    assert_eq!(letters[0].error.failure, refused);
    assert_eq!(letters[0].attempts, 5);
}

/// Panics on one chosen call and succeeds otherwise
struct PanickingWorker {
    panic_on: u32,
    calls: AtomicU32,
}

#[async_trait]
impl EventWorker for PanickingWorker {
    fn worker_name(&self) -> &str {
        "panicking"
    }

    fn handled_event_types(&self) -> &[&str] {
        &[event_types::TRADE_EXECUTED]
    }

    fn settings(&self) -> WorkerSettings {
        WorkerSettings {
            max_retries: 0,
            ..WorkerSettings::default()
        }
    }

    async fn process_event(&self, event: &Event, _: &ExecutionContext) -> Result<(), HandlerError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call == self.panic_on {
            panic!("worker crashed on {}", event.event_id());
        }
        if call < self.panic_on {
            return Err(HandlerError::failed("not ready"));
        }
        Ok(())
    }
}

#[tokio::test]
async fn panicking_half_open_trial_reopens_the_breaker() {
    let clock = FakeClock::new();
    let bus = InMemoryEventBus::with_clock(
        BusConfig {
            breaker: BreakerConfig {
                failure_threshold: 2,
                recovery_timeout: Duration::from_secs(60),
            },
            ..BusConfig::default()
        },
        clock.clone(),
    );
    let worker = Arc::new(PanickingWorker {
        panic_on: 3,
        calls: AtomicU32::new(0),
    });
    bus.register_worker(worker.clone()).await.unwrap();
    bus.start().await.unwrap();

    for n in 0..2 {
        assert!(bus.publish(trade(&format!("t{n}")), None, None).await.is_err());
    }
    assert_eq!(bus.workers()[0].breaker.state, BreakerState::Open);

    clock.advance(Duration::from_secs(60));
    assert!(bus.publish(trade("t2"), None, None).await.is_err());
    assert_eq!(worker.calls.load(Ordering::SeqCst), 3);
    assert_eq!(bus.workers()[0].breaker.state, BreakerState::Open);

    clock.advance(Duration::from_secs(60));
    bus.publish(trade("t3"), None, None).await.unwrap();
    assert_eq!(worker.calls.load(Ordering::SeqCst), 4);
    assert_eq!(bus.workers()[0].breaker.state, BreakerState::Closed);
}

/// Records whether a later event arrives while an earlier publish is open
#[derive(Default)]
struct OrderRecorder {
    publishing: AtomicBool,
    overlapped: AtomicBool,
    seen: Mutex<Vec<String>>,
}

#[async_trait]
impl EventWorker for OrderRecorder {
    fn worker_name(&self) -> &str {
        "order-recorder"
    }

    fn handled_event_types(&self) -> &[&str] {
        &[event_types::TRADE_EXECUTED]
    }

    async fn process_event(&self, event: &Event, _: &ExecutionContext) -> Result<(), HandlerError> {
        if self.publishing.swap(true, Ordering::SeqCst) {
            self.overlapped.store(true, Ordering::SeqCst);
        }
        tokio::task::yield_now().await;
        self.seen.lock().unwrap().push(event.event_id().to_string());
        self.publishing.store(false, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn sequential_publishes_never_overlap_at_a_worker() {
    let recorder = Arc::new(OrderRecorder::default());
    let bus = bus_with(recorder.clone()).await;

    for n in 0..20 {
        let id = format!("t{n}");
        bus.publish(trade(&id), None, None).await.unwrap();
        assert_eq!(recorder.seen.lock().unwrap().last(), Some(&id));
    }

    assert!(!recorder.overlapped.load(Ordering::SeqCst));
}

#[tokio::test]
async fn example_workers_share_one_bus() {
    let notifier = FakeNotifyAdapter::new();
    let sink = FakeReportSink::new();
    let store = MemoryAuditStore::new();
    let chain = AuditLogChain::open(ChainKey::new(AUDIT_SECRET).unwrap(), store.clone())
        .await
        .unwrap();
    let logger = AuditLogger::new(Arc::new(chain));

    let bus = InMemoryEventBus::new(BusConfig {
        retry: RetryConfig {
            retry_delay: Duration::from_millis(1),
            ..RetryConfig::default()
        },
        ..BusConfig::default()
    });
    bus.register_worker(Arc::new(RiskAlertWorker::new(notifier.clone())))
        .await
        .unwrap();
    bus.register_worker(Arc::new(NotificationWorker::new(notifier.clone())))
        .await
        .unwrap();
    bus.register_worker(Arc::new(ReportingWorker::new(sink.clone()).with_batch_size(10)))
        .await
        .unwrap();
    bus.register_worker(Arc::new(AuditTrailWorker::new(logger.clone())))
        .await
        .unwrap();
    bus.start().await.unwrap();

    let ctx = ExecutionContext::new(OperationType::ApiRequest).with_correlation_id("req-1");
    let login = Event::new(
        "user-1",
        EventPayload::UserLoggedIn {
            user_id: "user-1".to_string(),
            ip_address: None,
        },
    );
    bus.publish_batch(
        vec![trade("t1"), trade("t2"), breach("b1", Severity::Critical), login],
        Some(ctx),
    )
    .await
    .unwrap();

    // Report rows are still buffered until the worker stops
    assert!(sink.rows().is_empty());
    let report = bus.stop().await;
    assert!(report.drained_cleanly);

    assert_eq!(sink.rows().len(), 2);
    assert_eq!(notifier.sent().len(), 2);
    let entries = store.entries();
    assert_eq!(entries.len(), 4);
    assert!(entries
        .iter()
        .all(|e| e.correlation_id.as_deref() == Some("req-1")));
    assert!(logger.chain().verify().await.unwrap());

    let mut forged = entries[1].clone();
    forged.severity = if forged.severity == Severity::Critical {
        Severity::Low
    } else {
        Severity::Critical
    };
    assert_ne!(forged, entries[1]);
    store.replace(1, forged);
    assert!(!logger.chain().verify().await.unwrap());
}

#[tokio::test]
async fn stream_bus_runs_the_example_workers() {
    let stream = SharedStream::in_memory();
    let notifier = FakeNotifyAdapter::new();
    let bus = StreamEventBus::new(stream.clone(), BusConfig::default());
    bus.register_worker(Arc::new(RiskAlertWorker::new(notifier.clone())))
        .await
        .unwrap();
    bus.start().await.unwrap();

    bus.publish(breach("b1", Severity::Critical), Some("acct-1"), None)
        .await
        .unwrap();
    bus.publish(breach("b2", Severity::Low), Some("acct-1"), None)
        .await
        .unwrap();
    bus.wait_idle().await.unwrap();

    assert_eq!(notifier.sent().len(), 1);
    assert_eq!(bus.metrics().events_processed, 2);
    assert_eq!(stream.len(), 2);
    assert!(bus.stop().await.drained_cleanly);
}
