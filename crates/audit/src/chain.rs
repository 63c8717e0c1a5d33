// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Hash-linked audit chain
//!
//! Each entry stores the previous entry's integrity hash and is sealed with
//! a keyed hash over its own fields plus that link. Changing any stored
//! entry breaks its own seal; reordering or dropping entries breaks a link.

use crate::entry::{AuditDraft, AuditLogEntry, GENESIS_HASH};
use crate::error::AuditLogError;
use crate::hash::ChainKey;
use crate::store::AuditStore;
use rl_core::{Clock, IdGen, SystemClock, UuidIdGen};
use tokio::sync::Mutex;

/// Entries fetched per page when verifying a whole store
const VERIFY_PAGE: usize = 1_000;

struct ChainHead {
    last_hash: String,
    next_sequence: u64,
}

pub struct AuditLogChain<S, C = SystemClock, I = UuidIdGen> {
    key: ChainKey,
    store: S,
    clock: C,
    ids: I,
    head: Mutex<ChainHead>,
}

impl<S: AuditStore> AuditLogChain<S> {
    /// Continue the chain already in `store`, or start a new one
    pub async fn open(key: ChainKey, store: S) -> Result<Self, AuditLogError> {
        Self::open_with(key, store, SystemClock, UuidIdGen).await
    }
}

impl<S: AuditStore, C: Clock, I: IdGen> AuditLogChain<S, C, I> {
    pub async fn open_with(key: ChainKey, store: S, clock: C, ids: I) -> Result<Self, AuditLogError> {
        let head = match store.last().await? {
            Some(last) => ChainHead {
                last_hash: last.integrity_hash,
                next_sequence: last.sequence + 1,
            },
            None => ChainHead {
                last_hash: GENESIS_HASH.to_string(),
                next_sequence: 1,
            },
        };
        Ok(Self {
            key,
            store,
            clock,
            ids,
            head: Mutex::new(head),
        })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Seal a draft onto the end of the chain and persist it.
    ///
    /// Appends are serialized; the head only advances once the store has
    /// accepted the entry.
    pub async fn append(&self, draft: AuditDraft) -> Result<AuditLogEntry, AuditLogError> {
        let mut head = self.head.lock().await;

        let mut entry = AuditLogEntry {
            id: self.ids.next(),
            sequence: head.next_sequence,
            timestamp: self.clock.utc_now(),
            event_type: draft.event_type,
            severity: draft.severity,
            user_id: draft.user_id,
            session_id: draft.session_id,
            correlation_id: draft.correlation_id,
            resource_type: draft.resource_type,
            resource_id: draft.resource_id,
            message: draft.message,
            details: draft.details,
            previous_hash: head.last_hash.clone(),
            integrity_hash: String::new(),
        };
        entry.integrity_hash = self.key.seal(&entry)?;

        self.store.append(&entry).await?;

        head.last_hash = entry.integrity_hash.clone();
        head.next_sequence += 1;
        Ok(entry)
    }

    /// Check a contiguous run of entries, anchored at the first entry's link
    pub fn verify_chain_integrity(&self, entries: &[AuditLogEntry]) -> bool {
        verify_chain_integrity(&self.key, entries)
    }

    /// Check every stored entry, starting from the genesis link
    pub async fn verify(&self) -> Result<bool, AuditLogError> {
        let mut verifier = ChainVerifier::from_genesis(&self.key);
        let mut from = 1;
        loop {
            let page = self.store.fetch_range(from, VERIFY_PAGE).await?;
            let Some(last) = page.last() else {
                break;
            };
            from = last.sequence + 1;
            if !page.iter().all(|entry| verifier.check(entry)) {
                return Ok(false);
            }
        }
        tracing::debug!(entries = verifier.checked, "audit chain verified");
        Ok(true)
    }
}

/// Walk `entries` checking seals and links; logs the first violation found
pub fn verify_chain_integrity(key: &ChainKey, entries: &[AuditLogEntry]) -> bool {
    let mut verifier = ChainVerifier::anchored(key);
    entries.iter().all(|entry| verifier.check(entry))
}

struct ChainVerifier<'a> {
    key: &'a ChainKey,
    expected_previous: Option<String>,
    expected_sequence: Option<u64>,
    checked: usize,
}

impl<'a> ChainVerifier<'a> {
    fn anchored(key: &'a ChainKey) -> Self {
        Self {
            key,
            expected_previous: None,
            expected_sequence: None,
            checked: 0,
        }
    }

    fn from_genesis(key: &'a ChainKey) -> Self {
        Self {
            key,
            expected_previous: Some(GENESIS_HASH.to_string()),
            expected_sequence: Some(1),
            checked: 0,
        }
    }

    fn check(&mut self, entry: &AuditLogEntry) -> bool {
        if let Some(expected) = &self.expected_previous {
            if entry.previous_hash != *expected {
                tracing::error!(
                    entry_id = %entry.id,
                    sequence = entry.sequence,
                    position = self.checked,
                    "previous_hash does not match prior entry"
                );
                return false;
            }
        }
        if let Some(expected) = self.expected_sequence {
            if entry.sequence != expected {
                tracing::error!(
                    entry_id = %entry.id,
                    sequence = entry.sequence,
                    expected,
                    "audit sequence out of order"
                );
                return false;
            }
        }
        if !self.key.verify(entry) {
            tracing::error!(
                entry_id = %entry.id,
                sequence = entry.sequence,
                position = self.checked,
                "integrity_hash does not match entry contents"
            );
            return false;
        }

        self.expected_previous = Some(entry.integrity_hash.clone());
        self.expected_sequence = Some(entry.sequence + 1);
        self.checked += 1;
        true
    }
}

#[cfg(test)]
#[path = "chain_tests.rs"]
mod tests;
