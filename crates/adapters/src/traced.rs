// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Traced adapter wrappers for consistent observability

use crate::notify::{Notification, NotifyAdapter, NotifyError};
use crate::report::{ReportError, ReportRow, ReportSink};
use async_trait::async_trait;
use tracing::Instrument;

/// Wrapper that adds tracing to any NotifyAdapter
#[derive(Clone)]
pub struct TracedNotifyAdapter<N> {
    inner: N,
}

impl<N> TracedNotifyAdapter<N> {
    pub fn new(inner: N) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<N: NotifyAdapter> NotifyAdapter for TracedNotifyAdapter<N> {
    async fn notify(&self, notification: Notification) -> Result<(), NotifyError> {
        let span = tracing::info_span!(
            "notify.send",
            channel = %notification.channel,
            urgency = ?notification.urgency,
        );

        async {
            // Precondition: a notification needs somewhere to go
            if notification.channel.is_empty() {
                tracing::error!("notification has no channel");
                return Err(NotifyError::Rejected {
                    channel: String::new(),
                    reason: "empty channel".to_string(),
                });
            }

            tracing::debug!(title = %notification.title, "sending");
            let start = std::time::Instant::now();
            let result = self.inner.notify(notification).await;
            let elapsed = start.elapsed();

            match &result {
                Ok(()) => tracing::info!(elapsed_ms = elapsed.as_millis() as u64, "notified"),
                Err(e) => tracing::error!(
                    elapsed_ms = elapsed.as_millis() as u64,
                    error = %e,
                    "notify failed"
                ),
            }
            result
        }
        .instrument(span)
        .await
    }
}

/// Wrapper that adds tracing to any ReportSink
#[derive(Clone)]
pub struct TracedReportSink<R> {
    inner: R,
}

impl<R> TracedReportSink<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<R: ReportSink> ReportSink for TracedReportSink<R> {
    async fn write_batch(&self, rows: Vec<ReportRow>) -> Result<(), ReportError> {
        let span = tracing::info_span!("report.write_batch", rows = rows.len());

        async {
            let start = std::time::Instant::now();
            let result = self.inner.write_batch(rows).await;
            let elapsed = start.elapsed();

            match &result {
                Ok(()) => tracing::info!(elapsed_ms = elapsed.as_millis() as u64, "batch written"),
                Err(e) => tracing::error!(
                    elapsed_ms = elapsed.as_millis() as u64,
                    error = %e,
                    "batch write failed"
                ),
            }
            result
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
#[path = "traced_tests.rs"]
mod tests;
