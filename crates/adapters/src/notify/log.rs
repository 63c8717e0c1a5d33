// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Notify adapter that writes notifications to the daemon log

use super::{Notification, NotifyAdapter, NotifyError, NotifyUrgency};
use async_trait::async_trait;

/// Emits each notification as a log record under the `relay::notify` target.
///
/// Critical notifications are logged at warn level so they stand out in
/// the default filter.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogNotifyAdapter;

impl LogNotifyAdapter {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl NotifyAdapter for LogNotifyAdapter {
    async fn notify(&self, notification: Notification) -> Result<(), NotifyError> {
        let recipient = notification.recipient.as_deref().unwrap_or("-");
        match notification.urgency {
            NotifyUrgency::Critical => tracing::warn!(
                target: "relay::notify",
                channel = %notification.channel,
                recipient,
                title = %notification.title,
                "{}",
                notification.message
            ),
            _ => tracing::info!(
                target: "relay::notify",
                channel = %notification.channel,
                recipient,
                title = %notification.title,
                "{}",
                notification.message
            ),
        }
        Ok(())
    }
}
