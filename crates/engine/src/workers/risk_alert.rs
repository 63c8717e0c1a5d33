// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pages the risk desk when an account breaches a limit

use async_trait::async_trait;
use rl_adapters::{Notification, NotifyAdapter, NotifyUrgency};
use rl_core::{
    Event, EventPattern, EventPayload, EventWorker, ExecutionContext, HandlerError, Severity,
    WorkerSettings,
};
use std::time::Duration;

pub struct RiskAlertWorker<N> {
    notifier: N,
    pattern: EventPattern,
    channel: String,
    min_severity: Severity,
}

impl<N: NotifyAdapter> RiskAlertWorker<N> {
    pub fn new(notifier: N) -> Self {
        Self {
            notifier,
            pattern: EventPattern::new("Risk.**"),
            channel: "risk-desk".to_string(),
            min_severity: Severity::High,
        }
    }

    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = channel.into();
        self
    }

    /// Breaches below this severity are acknowledged without paging
    pub fn with_min_severity(mut self, severity: Severity) -> Self {
        self.min_severity = severity;
        self
    }

    fn alert(
        &self,
        account_id: &str,
        limit: &str,
        current_value: f64,
        limit_value: f64,
        severity: Severity,
    ) -> Notification {
        let notification = Notification::new(
            self.channel.as_str(),
            format!("Risk limit breached: {limit}"),
            format!(
                "Account {account_id} is at {current_value} against a {limit} limit of {limit_value} ({severity})"
            ),
        );
        match severity {
            Severity::Critical => notification.critical(),
            _ => notification.with_urgency(NotifyUrgency::Important),
        }
    }
}

#[async_trait]
impl<N: NotifyAdapter> EventWorker for RiskAlertWorker<N> {
    fn worker_name(&self) -> &str {
        "risk-alert"
    }

    fn can_handle(&self, event: &Event) -> bool {
        self.pattern.matches(event.event_type())
    }

    fn settings(&self) -> WorkerSettings {
        WorkerSettings {
            max_retries: 5,
            retry_delay: Duration::from_millis(500),
            processing_timeout: Duration::from_secs(10),
            ..WorkerSettings::default()
        }
    }

    async fn process_event(
        &self,
        event: &Event,
        _context: &ExecutionContext,
    ) -> Result<(), HandlerError> {
        let EventPayload::RiskLimitBreached {
            account_id,
            limit,
            current_value,
            limit_value,
            severity,
        } = event.payload()
        else {
            tracing::debug!(event_type = event.event_type(), "no alert for risk event");
            return Ok(());
        };

        if *severity < self.min_severity {
            tracing::debug!(%severity, account_id, "breach below paging threshold");
            return Ok(());
        }

        let notification = self.alert(account_id, limit, *current_value, *limit_value, *severity);
        self.notifier
            .notify(notification)
            .await
            .map_err(|e| HandlerError::failed(e.to_string()))?;
        tracing::info!(%severity, account_id, limit, "risk alert sent");
        Ok(())
    }
}

#[cfg(test)]
#[path = "risk_alert_tests.rs"]
mod tests;
