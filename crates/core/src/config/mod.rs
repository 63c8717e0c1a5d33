// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bus configuration
//!
//! Every section has defaults, so an empty document is a valid config.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    pub retry: RetryConfig,
    pub breaker: BreakerConfig,
    pub store: StoreConfig,
    pub dead_letter: DeadLetterConfig,
    pub health: HealthConfig,
    #[serde(with = "humantime_serde")]
    pub processing_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub shutdown_grace: Duration,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            breaker: BreakerConfig::default(),
            store: StoreConfig::default(),
            dead_letter: DeadLetterConfig::default(),
            health: HealthConfig::default(),
            processing_timeout: Duration::from_secs(30),
            shutdown_grace: Duration::from_secs(30),
        }
    }
}

impl BusConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: BusConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.breaker.failure_threshold == 0 {
            return Err(ConfigError::Invalid(
                "breaker.failure_threshold must be at least 1".to_string(),
            ));
        }
        if self.store.max_events == 0 {
            return Err(ConfigError::Invalid(
                "store.max_events must be at least 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.health.max_failure_rate) {
            return Err(ConfigError::Invalid(
                "health.max_failure_rate must be between 0 and 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    #[serde(with = "humantime_serde")]
    pub retry_delay: Duration,
    pub dead_letter_enabled: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay: Duration::from_secs(1),
            dead_letter_enabled: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerConfig {
    pub failure_threshold: u32,
    #[serde(with = "humantime_serde")]
    pub recovery_timeout: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub max_events: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { max_events: 10_000 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeadLetterConfig {
    pub max_entries: usize,
}

impl Default for DeadLetterConfig {
    fn default() -> Self {
        Self { max_entries: 1_000 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Degraded above this share of failed deliveries per published event
    pub max_failure_rate: f64,
    /// Degraded above this many dead letters
    pub max_dead_letters: usize,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            max_failure_rate: 0.10,
            max_dead_letters: 100,
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
