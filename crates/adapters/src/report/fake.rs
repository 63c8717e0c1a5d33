// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake report sink for testing
#![cfg_attr(coverage_nightly, coverage(off))]

use super::{ReportError, ReportRow, ReportSink};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct FakeReportState {
    batches: Vec<Vec<ReportRow>>,
    failures_remaining: usize,
}

/// Report sink that keeps written batches in memory
#[derive(Clone, Default)]
pub struct FakeReportSink {
    inner: Arc<Mutex<FakeReportState>>,
}

impl FakeReportSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `count` batch writes
    pub fn fail_next(&self, count: usize) {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .failures_remaining = count;
    }

    pub fn batches(&self) -> Vec<Vec<ReportRow>> {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .batches
            .clone()
    }

    /// All rows across batches, in write order
    pub fn rows(&self) -> Vec<ReportRow> {
        self.batches().into_iter().flatten().collect()
    }
}

#[async_trait]
impl ReportSink for FakeReportSink {
    async fn write_batch(&self, rows: Vec<ReportRow>) -> Result<(), ReportError> {
        let mut state = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if state.failures_remaining > 0 {
            state.failures_remaining -= 1;
            return Err(ReportError::Failed("injected failure".to_string()));
        }
        state.batches.push(rows);
        Ok(())
    }
}
