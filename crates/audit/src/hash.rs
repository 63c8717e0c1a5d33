// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Keyed integrity hashes for audit entries
//!
//! `integrity_hash = HMAC-SHA256(key, canonical_json(entry without integrity_hash))`,
//! hex encoded. The hashed document includes `previous_hash` and `timestamp`,
//! so each hash commits to the whole chain before it.

use crate::entry::{AuditEventType, AuditLogEntry};
use crate::error::AuditLogError;
use chrono::{DateTime, Utc};
use ring::hmac;
use rl_core::Severity;
use serde::Serialize;

/// Minimum secret length accepted for the chain key
pub const MIN_KEY_LEN: usize = 32;

/// Everything in an entry except its own hash, in a fixed field order
#[derive(Serialize)]
struct HashedFields<'a> {
    id: &'a str,
    sequence: u64,
    timestamp: &'a DateTime<Utc>,
    event_type: AuditEventType,
    severity: Severity,
    user_id: &'a Option<String>,
    session_id: &'a Option<String>,
    correlation_id: &'a Option<String>,
    resource_type: &'a Option<String>,
    resource_id: &'a Option<String>,
    message: &'a str,
    details: &'a serde_json::Value,
    previous_hash: &'a str,
}

impl<'a> From<&'a AuditLogEntry> for HashedFields<'a> {
    fn from(entry: &'a AuditLogEntry) -> Self {
        Self {
            id: &entry.id,
            sequence: entry.sequence,
            timestamp: &entry.timestamp,
            event_type: entry.event_type,
            severity: entry.severity,
            user_id: &entry.user_id,
            session_id: &entry.session_id,
            correlation_id: &entry.correlation_id,
            resource_type: &entry.resource_type,
            resource_id: &entry.resource_id,
            message: &entry.message,
            details: &entry.details,
            previous_hash: &entry.previous_hash,
        }
    }
}

/// HMAC key used to seal and check the chain
#[derive(Clone)]
pub struct ChainKey {
    key: hmac::Key,
}

impl ChainKey {
    pub fn new(secret: &[u8]) -> Result<Self, AuditLogError> {
        if secret.len() < MIN_KEY_LEN {
            return Err(AuditLogError::InvalidKey(format!(
                "key must be at least {} bytes, got {}",
                MIN_KEY_LEN,
                secret.len()
            )));
        }
        Ok(Self {
            key: hmac::Key::new(hmac::HMAC_SHA256, secret),
        })
    }

    /// Compute the integrity hash for an entry, ignoring its current one
    pub fn seal(&self, entry: &AuditLogEntry) -> Result<String, AuditLogError> {
        let data = serde_json::to_vec(&HashedFields::from(entry))?;
        let tag = hmac::sign(&self.key, &data);
        Ok(hex_encode(tag.as_ref()))
    }

    /// Check an entry's stored integrity hash in constant time
    pub fn verify(&self, entry: &AuditLogEntry) -> bool {
        let Some(tag) = hex_decode(&entry.integrity_hash) else {
            return false;
        };
        let Ok(data) = serde_json::to_vec(&HashedFields::from(entry)) else {
            return false;
        };
        hmac::verify(&self.key, &data, &tag).is_ok()
    }
}

impl std::fmt::Debug for ChainKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ChainKey(..)")
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

fn hex_decode(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 {
        return None;
    }
    (0..s.len())
        .step_by(2)
        .map(|i| s.get(i..i + 2).and_then(|pair| u8::from_str_radix(pair, 16).ok()))
        .collect()
}

#[cfg(test)]
#[path = "hash_tests.rs"]
mod tests;
