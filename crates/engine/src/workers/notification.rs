// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! User-facing notifications for account activity

use async_trait::async_trait;
use rl_adapters::{Notification, NotifyAdapter, NotifyUrgency};
use rl_core::{event_types, Event, EventPayload, EventWorker, ExecutionContext, HandlerError};

const HANDLED: &[&str] = &[
    event_types::USER_LOGGED_IN,
    event_types::CHALLENGE_COMPLETED,
    event_types::PAYMENT_PROCESSED,
];

pub struct NotificationWorker<N> {
    notifier: N,
    channel: String,
}

impl<N: NotifyAdapter> NotificationWorker<N> {
    pub fn new(notifier: N) -> Self {
        Self {
            notifier,
            channel: "email".to_string(),
        }
    }

    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = channel.into();
        self
    }

    fn notification_for(&self, payload: &EventPayload) -> Option<Notification> {
        let notification = match payload {
            EventPayload::UserLoggedIn {
                user_id,
                ip_address,
            } => Notification::new(
                self.channel.as_str(),
                "New sign-in",
                match ip_address {
                    Some(ip) => format!("Your account signed in from {ip}"),
                    None => "Your account signed in".to_string(),
                },
            )
            .with_recipient(user_id.as_str()),
            EventPayload::ChallengeCompleted {
                user_id,
                challenge_id,
                passed,
                final_balance,
            } => {
                let (title, urgency) = if *passed {
                    ("Challenge passed", NotifyUrgency::Important)
                } else {
                    ("Challenge ended", NotifyUrgency::Normal)
                };
                Notification::new(
                    self.channel.as_str(),
                    title,
                    format!("Challenge {challenge_id} finished with a balance of {final_balance:.2}"),
                )
                .with_recipient(user_id.as_str())
                .with_urgency(urgency)
            }
            EventPayload::PaymentProcessed {
                user_id,
                payment_id,
                amount,
                currency,
            } => Notification::new(
                self.channel.as_str(),
                "Payment received",
                format!("Payment {payment_id} of {amount:.2} {currency} was processed"),
            )
            .with_recipient(user_id.as_str()),
            _ => return None,
        };
        Some(notification)
    }
}

#[async_trait]
impl<N: NotifyAdapter> EventWorker for NotificationWorker<N> {
    fn worker_name(&self) -> &str {
        "notification"
    }

    fn handled_event_types(&self) -> &[&str] {
        HANDLED
    }

    async fn process_event(
        &self,
        event: &Event,
        _context: &ExecutionContext,
    ) -> Result<(), HandlerError> {
        let Some(notification) = self.notification_for(event.payload()) else {
            // Custom payload published under a handled type
            return Err(HandlerError::permanent(format!(
                "no notification template for {} payload",
                event.event_type()
            )));
        };
        let recipient = notification.recipient.clone().unwrap_or_default();
        self.notifier
            .notify(notification)
            .await
            .map_err(|e| HandlerError::failed(e.to_string()))?;
        tracing::debug!(event_type = event.event_type(), recipient, "user notified");
        Ok(())
    }
}

#[cfg(test)]
#[path = "notification_tests.rs"]
mod tests;
