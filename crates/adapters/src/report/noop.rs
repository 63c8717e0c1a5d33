// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! No-op report sink for when reporting is disabled.

use super::{ReportError, ReportRow, ReportSink};
use async_trait::async_trait;

/// Report sink that discards every batch.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoOpReportSink;

impl NoOpReportSink {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ReportSink for NoOpReportSink {
    async fn write_batch(&self, _rows: Vec<ReportRow>) -> Result<(), ReportError> {
        Ok(())
    }
}
