// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Circuit breaker state machine
//!
//! Pure state: callers ask [`CircuitBreaker::try_acquire`] before invoking a
//! worker and report the outcome afterwards. One breaker exists per worker.

use crate::clock::Clock;
use crate::config::BreakerConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl fmt::Display for BreakerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BreakerState::Closed => "closed",
            BreakerState::Open => "open",
            BreakerState::HalfOpen => "half-open",
        };
        f.write_str(s)
    }
}

/// Read-only view of a breaker for monitoring
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakerSnapshot {
    pub state: BreakerState,
    pub failure_count: u32,
    pub last_failure_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    failure_threshold: u32,
    recovery_timeout: Duration,
    state: BreakerState,
    failure_count: u32,
    last_failure: Option<Instant>,
    last_failure_at: Option<DateTime<Utc>>,
    trial_in_flight: bool,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, recovery_timeout: Duration) -> Self {
        Self {
            failure_threshold: failure_threshold.max(1),
            recovery_timeout,
            state: BreakerState::Closed,
            failure_count: 0,
            last_failure: None,
            last_failure_at: None,
            trial_in_flight: false,
        }
    }

    pub fn from_config(config: &BreakerConfig) -> Self {
        Self::new(config.failure_threshold, config.recovery_timeout)
    }

    pub fn state(&self) -> BreakerState {
        self.state
    }

    pub fn failure_count(&self) -> u32 {
        self.failure_count
    }

    /// Ask to let one call through.
    ///
    /// An open breaker whose recovery timeout has elapsed moves to half-open
    /// and admits exactly one trial; further calls are rejected until that
    /// trial reports back.
    pub fn try_acquire(&mut self, clock: &impl Clock) -> bool {
        match self.state {
            BreakerState::Closed => true,
            BreakerState::Open => {
                let recovered = self
                    .last_failure
                    .map(|at| clock.now().saturating_duration_since(at) >= self.recovery_timeout)
                    .unwrap_or(true);
                if recovered {
                    self.state = BreakerState::HalfOpen;
                    self.trial_in_flight = true;
                }
                recovered
            }
            BreakerState::HalfOpen => {
                if self.trial_in_flight {
                    false
                } else {
                    self.trial_in_flight = true;
                    true
                }
            }
        }
    }

    pub fn record_success(&mut self) {
        self.state = BreakerState::Closed;
        self.failure_count = 0;
        self.trial_in_flight = false;
    }

    pub fn record_failure(&mut self, clock: &impl Clock) {
        self.failure_count = self.failure_count.saturating_add(1);
        self.last_failure = Some(clock.now());
        self.last_failure_at = Some(clock.utc_now());
        self.trial_in_flight = false;

        match self.state {
            BreakerState::HalfOpen => self.state = BreakerState::Open,
            BreakerState::Closed if self.failure_count >= self.failure_threshold => {
                self.state = BreakerState::Open
            }
            _ => {}
        }
    }

    /// Give back a half-open trial whose call never completed
    pub fn release_trial(&mut self) {
        self.trial_in_flight = false;
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        BreakerSnapshot {
            state: self.state,
            failure_count: self.failure_count,
            last_failure_at: self.last_failure_at,
        }
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::from_config(&BreakerConfig::default())
    }
}

#[cfg(test)]
#[path = "breaker_tests.rs"]
mod tests;
