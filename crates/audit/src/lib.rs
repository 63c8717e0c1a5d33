// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! rl-audit: tamper-evident audit trail
//!
//! Entries are sealed with an HMAC-SHA256 over their contents and the
//! previous entry's seal, then handed to an [`AuditStore`].

mod chain;
mod entry;
mod error;
mod hash;
mod logger;
pub mod store;

pub use chain::{verify_chain_integrity, AuditLogChain};
pub use entry::{AuditDraft, AuditEventType, AuditLogEntry, GENESIS_HASH};
pub use error::AuditLogError;
pub use hash::{ChainKey, MIN_KEY_LEN};
pub use logger::{draft_for_event, AuditLogger};
pub use store::{AuditStore, JsonlAuditStore, MemoryAuditStore};
