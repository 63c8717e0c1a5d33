// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::AuditStore;
use crate::entry::AuditLogEntry;
use crate::error::AuditLogError;
use async_trait::async_trait;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

struct JsonlInner {
    file: File,
    entries: Vec<AuditLogEntry>,
    /// File length after the last fully written entry
    committed_len: u64,
}

impl JsonlInner {
    async fn write_line(&mut self, line: &[u8]) -> std::io::Result<()> {
        let written = async {
            self.file.write_all(line).await?;
            self.file.flush().await?;
            self.file.sync_all().await
        }
        .await;
        if let Err(e) = written {
            self.rollback().await;
            return Err(e);
        }
        self.committed_len += line.len() as u64;
        Ok(())
    }

    /// Cut off a partially written line so the file still opens
    async fn rollback(&mut self) {
        if let Err(e) = self.file.set_len(self.committed_len).await {
            tracing::error!(error = %e, len = self.committed_len, "failed to truncate audit file after a failed append");
        }
    }
}

/// Audit store appending one JSON entry per line, fsync'd per append.
///
/// A failed append is truncated away. Other damage is never repaired:
/// opening the file fails so it is investigated rather than hidden.
#[derive(Clone)]
pub struct JsonlAuditStore {
    path: PathBuf,
    inner: Arc<Mutex<JsonlInner>>,
}

impl JsonlAuditStore {
    pub fn open(path: &Path) -> Result<Self, AuditLogError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let entries = if path.exists() {
            Self::load(path)?
        } else {
            Vec::new()
        };
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let committed_len = file.metadata()?.len();

        tracing::debug!(path = %path.display(), entries = entries.len(), "audit store opened");

        Ok(Self {
            path: path.to_path_buf(),
            inner: Arc::new(Mutex::new(JsonlInner {
                file: File::from_std(file),
                entries,
                committed_len,
            })),
        })
    }

    fn load(path: &Path) -> Result<Vec<AuditLogEntry>, AuditLogError> {
        let contents = std::fs::read_to_string(path)?;
        let mut entries: Vec<AuditLogEntry> = Vec::new();

        for (index, line) in contents.lines().enumerate() {
            if line.is_empty() {
                continue;
            }
            let entry: AuditLogEntry =
                serde_json::from_str(line).map_err(|e| AuditLogError::Corrupt {
                    line: index + 1,
                    reason: e.to_string(),
                })?;
            let expected = entries.len() as u64 + 1;
            if entry.sequence != expected {
                return Err(AuditLogError::SequenceGap {
                    expected,
                    actual: entry.sequence,
                });
            }
            entries.push(entry);
        }

        Ok(entries)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl AuditStore for JsonlAuditStore {
    async fn append(&self, entry: &AuditLogEntry) -> Result<(), AuditLogError> {
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');

        let mut inner = self.inner.lock().await;
        inner.write_line(line.as_bytes()).await?;
        inner.entries.push(entry.clone());
        Ok(())
    }

    async fn fetch_range(
        &self,
        from_sequence: u64,
        limit: usize,
    ) -> Result<Vec<AuditLogEntry>, AuditLogError> {
        let inner = self.inner.lock().await;
        let start = from_sequence.saturating_sub(1) as usize;
        Ok(inner.entries.iter().skip(start).take(limit).cloned().collect())
    }

    async fn last(&self) -> Result<Option<AuditLogEntry>, AuditLogError> {
        let inner = self.inner.lock().await;
        Ok(inner.entries.last().cloned())
    }

    async fn count(&self) -> Result<u64, AuditLogError> {
        let inner = self.inner.lock().await;
        Ok(inner.entries.len() as u64)
    }
}

#[cfg(test)]
#[path = "jsonl_tests.rs"]
mod tests;
