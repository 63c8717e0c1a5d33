// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! rl-core: domain types for the relay event bus
//!
//! This crate provides:
//! - Events, execution contexts and event-type patterns
//! - Worker traits and the worker lifecycle state machine
//! - The circuit breaker state machine
//! - Metrics, health assessment and bus configuration
//! - Clock and id abstractions with deterministic fakes

pub mod clock;
pub mod id;

pub mod breaker;
pub mod config;
pub mod context;
pub mod event;
pub mod metrics;
pub mod pattern;
pub mod worker;

pub use breaker::{BreakerSnapshot, BreakerState, CircuitBreaker};
pub use clock::{Clock, FakeClock, SystemClock};
pub use config::{
    BreakerConfig, BusConfig, ConfigError, DeadLetterConfig, HealthConfig, RetryConfig,
    StoreConfig,
};
pub use context::{ExecutionContext, OperationType};
pub use event::{event_types, Event, EventPayload, EventValidationError, Severity, TradeSide};
pub use id::{IdGen, SequentialIdGen, UuidIdGen};
pub use metrics::{assess_health, BusMetrics, HealthStatus, WorkerMetrics};
pub use pattern::EventPattern;
pub use worker::{EventHandler, EventWorker, HandlerError, WorkerSettings, WorkerState, WorkerStatus};
