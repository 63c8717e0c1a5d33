// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
// Enable coverage(off) attribute for excluding test infrastructure
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! rl-engine: event buses, delivery policy and workers
//!
//! Two [`EventBus`] implementations share one delivery pipeline (worker
//! registry, per-worker circuit breakers, retry with backoff and a bounded
//! dead-letter queue):
//! - [`InMemoryEventBus`] delivers inside `publish` and keeps a replayable
//!   [`EventStore`]
//! - [`StreamEventBus`] appends to a durable stream consumed per group

mod bus;
mod cancel;
mod dead_letter;
mod dispatch;
mod error;
mod memory;
mod metrics;
mod registry;
mod retry;
mod store;
mod stream;
mod subscription;
pub mod workers;

#[cfg(test)]
mod testing;

pub use bus::{EventBus, ReplayReport, ShutdownReport};
pub use cancel::{CancelSignal, CancelSource};
pub use dead_letter::{DeadLetter, DeadLetterQueue};
pub use error::{EventBusError, EventFailure, EventHandlingError, HandlingFailure};
pub use memory::InMemoryEventBus;
pub use registry::{WorkerHandle, WorkerRegistry, WorkerSnapshot};
pub use retry::{retry_with_backoff, RetryFailure, RetryPolicy};
pub use store::{EventStore, ReplayFilter, StoredEvent};
pub use stream::{GroupStatus, SharedStream, StreamEventBus};
pub use subscription::{SubscribeOptions, Subscription};
pub use workers::{AuditTrailWorker, NotificationWorker, ReportingWorker, RiskAlertWorker};
