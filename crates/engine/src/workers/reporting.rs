// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Batches trading activity into the reporting store
//!
//! Rows are buffered and written once the buffer reaches the batch size.
//! A failed write keeps the rows buffered, so the retried event does not
//! add its row twice. Whatever is left is flushed during cleanup.

use async_trait::async_trait;
use rl_adapters::{ReportRow, ReportSink};
use rl_core::{event_types, Event, EventWorker, ExecutionContext, HandlerError, WorkerSettings};
use tokio::sync::Mutex;

const HANDLED: &[&str] = &[event_types::TRADE_EXECUTED, event_types::POSITION_CLOSED];

pub struct ReportingWorker<R> {
    sink: R,
    batch_size: usize,
    buffer: Mutex<Vec<ReportRow>>,
}

impl<R: ReportSink> ReportingWorker<R> {
    pub fn new(sink: R) -> Self {
        Self {
            sink,
            batch_size: WorkerSettings::default().batch_size,
            buffer: Mutex::new(Vec::new()),
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Rows waiting for the next flush
    pub async fn buffered(&self) -> usize {
        self.buffer.lock().await.len()
    }

    async fn flush(&self, buffer: &mut Vec<ReportRow>) -> Result<(), HandlerError> {
        if buffer.is_empty() {
            return Ok(());
        }
        let count = buffer.len();
        self.sink
            .write_batch(buffer.clone())
            .await
            .map_err(|e| HandlerError::failed(format!("report batch of {count} rows: {e}")))?;
        buffer.clear();
        tracing::debug!(rows = count, "report batch written");
        Ok(())
    }
}

#[async_trait]
impl<R: ReportSink> EventWorker for ReportingWorker<R> {
    fn worker_name(&self) -> &str {
        "reporting"
    }

    fn handled_event_types(&self) -> &[&str] {
        HANDLED
    }

    fn settings(&self) -> WorkerSettings {
        WorkerSettings {
            batch_size: self.batch_size,
            ..WorkerSettings::default()
        }
    }

    async fn process_event(
        &self,
        event: &Event,
        _context: &ExecutionContext,
    ) -> Result<(), HandlerError> {
        let row = ReportRow::from_event(event).map_err(|e| HandlerError::permanent(e.to_string()))?;

        let mut buffer = self.buffer.lock().await;
        if !buffer.iter().any(|r| r.event_id == row.event_id) {
            buffer.push(row);
        }
        if buffer.len() >= self.batch_size {
            self.flush(&mut buffer).await?;
        }
        Ok(())
    }

    async fn cleanup(&self) -> Result<(), HandlerError> {
        let mut buffer = self.buffer.lock().await;
        let pending = buffer.len();
        self.flush(&mut buffer).await.inspect_err(|e| {
            tracing::error!(rows = pending, error = %e, "final report flush failed");
        })
    }
}

#[cfg(test)]
#[path = "reporting_tests.rs"]
mod tests;
