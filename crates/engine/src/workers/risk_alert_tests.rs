// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use rl_adapters::FakeNotifyAdapter;
use yare::parameterized;

fn breach(severity: Severity) -> Event {
    Event::new(
        "acct-7",
        EventPayload::RiskLimitBreached {
            account_id: "acct-7".to_string(),
            limit: "max_drawdown".to_string(),
            current_value: 11.5,
            limit_value: 10.0,
            severity,
        },
    )
}

#[test]
fn handles_every_risk_event_type() {
    let worker = RiskAlertWorker::new(FakeNotifyAdapter::new());
    assert!(worker.can_handle(&breach(Severity::Low)));
    assert!(worker.can_handle(&Event::custom(
        "Risk.Exposure.Warning.v1",
        "acct-7",
        serde_json::json!({})
    )));
    assert!(!worker.can_handle(&Event::custom(
        "Trading.Trade.Executed.v1",
        "acct-7",
        serde_json::json!({})
    )));
}

#[parameterized(
    critical = { Severity::Critical, Some(NotifyUrgency::Critical) },
    high = { Severity::High, Some(NotifyUrgency::Important) },
    medium = { Severity::Medium, None },
    low = { Severity::Low, None },
)]
#[test_macro(tokio::test)]
async fn pages_by_severity(severity: Severity, urgency: Option<NotifyUrgency>) {
    let notifier = FakeNotifyAdapter::new();
    let worker = RiskAlertWorker::new(notifier.clone());

    worker
        .process_event(&breach(severity), &ExecutionContext::system())
        .await
        .unwrap();

    let sent = notifier.sent();
    assert_eq!(sent.first().map(|n| n.urgency), urgency);
    if let Some(alert) = sent.first() {
        assert_eq!(alert.channel, "risk-desk");
        assert!(alert.message.contains("acct-7"));
        assert!(alert.title.contains("max_drawdown"));
    }
}

#[tokio::test]
async fn threshold_is_configurable() {
    let notifier = FakeNotifyAdapter::new();
    let worker = RiskAlertWorker::new(notifier.clone())
        .with_min_severity(Severity::Low)
        .with_channel("ops");

    worker
        .process_event(&breach(Severity::Low), &ExecutionContext::system())
        .await
        .unwrap();

    assert_eq!(notifier.sent()[0].channel, "ops");
}

#[tokio::test]
async fn other_risk_events_are_ignored() {
    let notifier = FakeNotifyAdapter::new();
    let worker = RiskAlertWorker::new(notifier.clone());
    let event = Event::custom("Risk.Exposure.Warning.v1", "acct-7", serde_json::json!({}));

    worker
        .process_event(&event, &ExecutionContext::system())
        .await
        .unwrap();

    assert_eq!(notifier.attempts(), 0);
}

#[tokio::test]
async fn delivery_failure_is_retryable() {
    let notifier = FakeNotifyAdapter::new();
    notifier.fail_next(1);
    let worker = RiskAlertWorker::new(notifier.clone());

    let err = worker
        .process_event(&breach(Severity::Critical), &ExecutionContext::system())
        .await
        .unwrap_err();

    assert!(!err.is_permanent());
    assert!(notifier.sent().is_empty());
}
