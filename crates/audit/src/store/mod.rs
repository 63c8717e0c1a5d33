// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Persistence for the audit chain: append an entry, fetch a range

mod jsonl;
mod memory;

pub use jsonl::JsonlAuditStore;
pub use memory::MemoryAuditStore;

use crate::entry::AuditLogEntry;
use crate::error::AuditLogError;
use async_trait::async_trait;

/// Append-only storage for sealed audit entries
#[async_trait]
pub trait AuditStore: Send + Sync + 'static {
    /// Persist one entry. Entries arrive in sequence order.
    async fn append(&self, entry: &AuditLogEntry) -> Result<(), AuditLogError>;

    /// Up to `limit` entries starting at `from_sequence`
    async fn fetch_range(
        &self,
        from_sequence: u64,
        limit: usize,
    ) -> Result<Vec<AuditLogEntry>, AuditLogError>;

    async fn last(&self) -> Result<Option<AuditLogEntry>, AuditLogError>;

    async fn count(&self) -> Result<u64, AuditLogError>;
}
