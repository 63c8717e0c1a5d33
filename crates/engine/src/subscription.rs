// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Handler subscriptions keyed by event-type pattern

use crate::retry::RetryPolicy;
use rl_core::{BusConfig, Event, EventHandler, EventPattern};
use std::sync::{Arc, RwLock};
use std::time::Duration;

/// Per-subscription delivery options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribeOptions {
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub dead_letter_enabled: bool,
    pub timeout: Duration,
}

impl SubscribeOptions {
    pub fn from_config(config: &BusConfig) -> Self {
        Self {
            max_retries: config.retry.max_retries,
            retry_delay: config.retry.retry_delay,
            dead_letter_enabled: config.retry.dead_letter_enabled,
            timeout: config.processing_timeout,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, self.retry_delay)
    }
}

impl Default for SubscribeOptions {
    fn default() -> Self {
        Self::from_config(&BusConfig::default())
    }
}

#[derive(Clone)]
pub struct Subscription {
    pub pattern: EventPattern,
    pub handler: Arc<dyn EventHandler>,
    pub consumer_group: Option<String>,
    pub options: SubscribeOptions,
}

impl Subscription {
    pub fn handler_name(&self) -> &str {
        self.handler.handler_name()
    }

    /// Consumer group on stream-backed buses, defaulting to the handler name
    pub fn group(&self) -> &str {
        self.consumer_group
            .as_deref()
            .unwrap_or_else(|| self.handler_name())
    }
}

fn same_handler(a: &Arc<dyn EventHandler>, b: &Arc<dyn EventHandler>) -> bool {
    // Data pointers only; vtables can differ between codegen units
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}

#[derive(Default)]
pub(crate) struct Subscriptions {
    entries: RwLock<Vec<Subscription>>,
}

impl Subscriptions {
    pub(crate) fn add(&self, subscription: Subscription) {
        tracing::info!(
            pattern = %subscription.pattern,
            handler = subscription.handler_name(),
            "handler subscribed"
        );
        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(subscription);
    }

    /// Remove the subscription of `handler` to exactly `pattern`
    pub(crate) fn remove(&self, pattern: &EventPattern, handler: &Arc<dyn EventHandler>) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        let before = entries.len();
        entries.retain(|s| !(s.pattern == *pattern && same_handler(&s.handler, handler)));
        before != entries.len()
    }

    pub(crate) fn matching(&self, event: &Event) -> Vec<Subscription> {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|s| s.pattern.matches(event.event_type()))
            .cloned()
            .collect()
    }

    pub(crate) fn groups(&self) -> Vec<String> {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|s| s.group().to_string())
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }
}
