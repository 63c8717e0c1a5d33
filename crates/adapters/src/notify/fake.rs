// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake notification adapter for testing
#![cfg_attr(coverage_nightly, coverage(off))]

use super::{Notification, NotifyAdapter, NotifyError};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct FakeNotifyState {
    sent: Vec<Notification>,
    attempts: usize,
    failures_remaining: usize,
}

/// Fake notification adapter that records deliveries
#[derive(Clone, Default)]
pub struct FakeNotifyAdapter {
    inner: Arc<Mutex<FakeNotifyState>>,
}

impl FakeNotifyAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `count` deliveries
    pub fn fail_next(&self, count: usize) {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .failures_remaining = count;
    }

    /// Successfully delivered notifications
    pub fn sent(&self) -> Vec<Notification> {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .sent
            .clone()
    }

    /// Every delivery attempt, including failed ones
    pub fn attempts(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).attempts
    }
}

#[async_trait]
impl NotifyAdapter for FakeNotifyAdapter {
    async fn notify(&self, notification: Notification) -> Result<(), NotifyError> {
        let mut state = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        state.attempts += 1;
        if state.failures_remaining > 0 {
            state.failures_remaining -= 1;
            return Err(NotifyError::Failed("injected failure".to_string()));
        }
        state.sent.push(notification);
        Ok(())
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
