// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scripted workers and handlers for unit tests
#![cfg_attr(coverage_nightly, coverage(off))]

use async_trait::async_trait;
use rl_core::{
    Event, EventHandler, EventWorker, ExecutionContext, HandlerError, OperationType,
    WorkerSettings,
};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Worker that fails a configured number of times, then succeeds
pub(crate) struct ScriptedWorker {
    name: String,
    types: Vec<&'static str>,
    group: Option<String>,
    settings: WorkerSettings,
    failures_remaining: AtomicU32,
    permanent: bool,
    delay: Option<Duration>,
    attempts: AtomicU32,
    seen: Mutex<Vec<(String, OperationType)>>,
}

impl ScriptedWorker {
    pub(crate) fn new(name: &str, types: &[&'static str]) -> Self {
        Self {
            name: name.to_string(),
            types: types.to_vec(),
            group: None,
            settings: WorkerSettings {
                retry_delay: Duration::from_millis(10),
                ..WorkerSettings::default()
            },
            failures_remaining: AtomicU32::new(0),
            permanent: false,
            delay: None,
            attempts: AtomicU32::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Fail the first `count` attempts
    pub(crate) fn failing(self, count: u32) -> Self {
        self.failures_remaining.store(count, Ordering::SeqCst);
        self
    }

    pub(crate) fn always_failing(self) -> Self {
        self.failing(u32::MAX)
    }

    /// Fail with a permanent error instead of a transient one
    pub(crate) fn permanent(mut self) -> Self {
        self.permanent = true;
        self
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub(crate) fn with_retries(mut self, max_retries: u32, retry_delay: Duration) -> Self {
        self.settings.max_retries = max_retries;
        self.settings.retry_delay = retry_delay;
        self
    }

    pub(crate) fn with_timeout(mut self, timeout: Duration) -> Self {
        self.settings.processing_timeout = timeout;
        self
    }

    pub(crate) fn in_group(mut self, group: &str) -> Self {
        self.group = Some(group.to_string());
        self
    }

    pub(crate) fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Ids of events processed successfully, in order
    pub(crate) fn processed(&self) -> Vec<String> {
        self.seen
            .lock()
            .unwrap()
            .iter()
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub(crate) fn operation_types(&self) -> Vec<OperationType> {
        self.seen.lock().unwrap().iter().map(|(_, op)| *op).collect()
    }
}

#[async_trait]
impl EventWorker for ScriptedWorker {
    fn worker_name(&self) -> &str {
        &self.name
    }

    fn handled_event_types(&self) -> &[&str] {
        &self.types
    }

    fn settings(&self) -> WorkerSettings {
        self.settings.clone()
    }

    fn consumer_group(&self) -> Option<&str> {
        self.group.as_deref()
    }

    async fn process_event(
        &self,
        event: &Event,
        context: &ExecutionContext,
    ) -> Result<(), HandlerError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let should_fail = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                match n {
                    0 => None,
                    u32::MAX => Some(u32::MAX),
                    n => Some(n - 1),
                }
            })
            .is_ok();
        if should_fail {
            return Err(if self.permanent {
                HandlerError::permanent("rejected")
            } else {
                HandlerError::failed("transient failure")
            });
        }

        self.seen
            .lock()
            .unwrap()
            .push((event.event_id().to_string(), context.operation_type()));
        Ok(())
    }
}

/// Subscription handler that records what it receives
#[derive(Default)]
pub(crate) struct RecordingHandler {
    pub(crate) name: &'static str,
    pub(crate) received: Mutex<Vec<String>>,
    pub(crate) fail: bool,
}

impl RecordingHandler {
    pub(crate) fn new(name: &'static str) -> Self {
        Self {
            name,
            ..Self::default()
        }
    }

    pub(crate) fn received(&self) -> Vec<String> {
        self.received.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventHandler for RecordingHandler {
    fn handler_name(&self) -> &str {
        self.name
    }

    async fn handle(&self, event: &Event, _: &ExecutionContext) -> Result<(), HandlerError> {
        if self.fail {
            return Err(HandlerError::failed("handler down"));
        }
        self.received
            .lock()
            .unwrap()
            .push(event.event_id().to_string());
        Ok(())
    }
}
