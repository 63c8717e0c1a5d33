// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::AuditStore;
use crate::entry::AuditLogEntry;
use crate::error::AuditLogError;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

/// Audit store held in process memory
#[derive(Clone, Default)]
pub struct MemoryAuditStore {
    entries: Arc<Mutex<Vec<AuditLogEntry>>>,
}

impl MemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every stored entry, in order
    pub fn entries(&self) -> Vec<AuditLogEntry> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Overwrite a stored entry in place
    #[cfg(any(test, feature = "test-support"))]
    pub fn replace(&self, index: usize, entry: AuditLogEntry) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(slot) = entries.get_mut(index) {
            *slot = entry;
        }
    }
}

#[async_trait]
impl AuditStore for MemoryAuditStore {
    async fn append(&self, entry: &AuditLogEntry) -> Result<(), AuditLogError> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(entry.clone());
        Ok(())
    }

    async fn fetch_range(
        &self,
        from_sequence: u64,
        limit: usize,
    ) -> Result<Vec<AuditLogEntry>, AuditLogError> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        Ok(entries
            .iter()
            .filter(|e| e.sequence >= from_sequence)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn last(&self) -> Result<Option<AuditLogEntry>, AuditLogError> {
        Ok(self
            .entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .last()
            .cloned())
    }

    async fn count(&self) -> Result<u64, AuditLogError> {
        Ok(self.entries.lock().unwrap_or_else(|e| e.into_inner()).len() as u64)
    }
}
