// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
// Enable coverage(off) attribute for excluding test infrastructure
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Adapters for worker side effects

pub mod notify;
pub mod report;
pub mod traced;

pub use notify::{
    LogNotifyAdapter, NoOpNotifyAdapter, Notification, NotifyAdapter, NotifyError, NotifyUrgency,
};
pub use report::{JsonlReportSink, NoOpReportSink, ReportError, ReportRow, ReportSink};
pub use traced::{TracedNotifyAdapter, TracedReportSink};

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
pub use notify::FakeNotifyAdapter;
#[cfg(any(test, feature = "test-support"))]
pub use report::FakeReportSink;
