// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Retry with exponential backoff

use crate::cancel::CancelSignal;
use crate::error::HandlingFailure;
use rl_core::{RetryConfig, WorkerSettings};
use std::future::Future;
use std::time::Duration;

/// How many times a target is re-invoked and how long to wait in between.
///
/// The delay before retry `k` (0-indexed) is `retry_delay * 2^k`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub retry_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, retry_delay: Duration) -> Self {
        Self {
            max_retries,
            retry_delay,
        }
    }

    /// Total invocations including the first
    pub fn attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    pub fn delay_before_retry(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry).unwrap_or(u32::MAX);
        self.retry_delay.saturating_mul(factor)
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self::new(config.max_retries, config.retry_delay)
    }
}

impl From<&WorkerSettings> for RetryPolicy {
    fn from(settings: &WorkerSettings) -> Self {
        Self::new(settings.max_retries, settings.retry_delay)
    }
}

/// The last failure once retrying stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryFailure {
    pub failure: HandlingFailure,
    /// Retries performed before giving up (attempts - 1)
    pub retries: u32,
}

/// Run `attempt` until it succeeds, the budget is spent, or a terminal
/// failure comes back. The closure receives the 0-indexed retry number.
///
/// Returns the number of retries that preceded the success. A circuit-open
/// rejection after the target already ran reports the target's last failure
/// instead, since no new attempt was made.
pub async fn retry_with_backoff<F, Fut>(
    policy: RetryPolicy,
    cancel: &CancelSignal,
    mut attempt: F,
) -> Result<u32, RetryFailure>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<(), HandlingFailure>>,
{
    let mut retries = 0;
    let mut last_invoked: Option<HandlingFailure> = None;
    loop {
        let failure = match attempt(retries).await {
            Ok(()) => return Ok(retries),
            Err(failure) => failure,
        };

        if matches!(failure, HandlingFailure::CircuitOpen) {
            if let Some(previous) = last_invoked {
                tracing::debug!(error = %previous, "circuit opened during retries");
                return Err(RetryFailure {
                    failure: previous,
                    retries: retries.saturating_sub(1),
                });
            }
        }

        if failure.is_terminal() || retries >= policy.max_retries {
            return Err(RetryFailure { failure, retries });
        }
        last_invoked = Some(failure.clone());

        let delay = policy.delay_before_retry(retries);
        tracing::debug!(
            retry = retries + 1,
            delay_ms = delay.as_millis() as u64,
            error = %failure,
            "retrying after backoff"
        );

        let mut cancel = cancel.clone();
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = cancel.cancelled() => {
                return Err(RetryFailure {
                    failure: HandlingFailure::Cancelled,
                    retries,
                });
            }
        }
        retries += 1;
    }
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod tests;
