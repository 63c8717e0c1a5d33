// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Stream entry structure with checksum verification
//!
//! Each entry carries its stream id, append timestamp, the published
//! record and a CRC32 checksum of the serialized record.

use crate::error::StreamError;
use rl_core::{Event, ExecutionContext};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// What a publisher put on the stream
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamRecord {
    pub event: Event,
    pub context: ExecutionContext,
    pub routing_key: Option<String>,
}

/// A single entry in the event stream
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamEntry {
    /// Monotonically increasing, starting at 1
    pub id: u64,
    /// Microseconds since Unix epoch
    pub timestamp_micros: u64,
    pub record: StreamRecord,
    /// CRC32 checksum of the serialized record
    pub checksum: u32,
}

impl StreamEntry {
    pub fn new(id: u64, record: StreamRecord) -> Self {
        let timestamp_micros = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as u64)
            .unwrap_or(0);
        Self::new_with_timestamp(id, timestamp_micros, record)
    }

    pub fn new_with_timestamp(id: u64, timestamp_micros: u64, record: StreamRecord) -> Self {
        let checksum = Self::calculate_checksum(&record);
        Self {
            id,
            timestamp_micros,
            record,
            checksum,
        }
    }

    fn calculate_checksum(record: &StreamRecord) -> u32 {
        // Records hold only strings, timestamps and JSON values
        let json = serde_json::to_string(record).unwrap_or_default();
        crc32fast::hash(json.as_bytes())
    }

    /// Verify the checksum matches the record
    pub fn verify(&self) -> bool {
        self.checksum == Self::calculate_checksum(&self.record)
    }

    /// Serialize to newline-delimited JSON (one line)
    pub fn to_line(&self) -> Result<String, StreamError> {
        serde_json::to_string(self).map_err(StreamError::from)
    }

    /// Parse from a single line of JSON
    pub fn from_line(line: &str) -> Result<Self, StreamError> {
        serde_json::from_str(line).map_err(StreamError::from)
    }
}

#[cfg(test)]
#[path = "entry_tests.rs"]
mod tests;
