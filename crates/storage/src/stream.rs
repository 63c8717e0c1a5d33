// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable append-only event stream with consumer groups
//!
//! Entries are appended as checksummed JSON lines and fsync'd before
//! `append` returns. Consumer groups track the last entry handed out and
//! the entries delivered but not yet acknowledged; their offsets live in a
//! sidecar file next to the stream, replaced atomically on every change.
//!
//! Times passed to `read_group` and `claim_pending` are microseconds since
//! the Unix epoch, the same unit as [`StreamEntry::timestamp_micros`].

use crate::entry::{StreamEntry, StreamRecord};
use crate::error::StreamError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Where a new consumer group starts reading
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartPosition {
    /// Deliver every entry already on the stream
    Beginning,
    /// Deliver only entries appended after the group is created
    Latest,
}

/// An entry delivered to a consumer and not yet acknowledged
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingDelivery {
    pub consumer: String,
    pub deliveries: u32,
    /// When the entry was last handed to `consumer`
    #[serde(default)]
    pub delivered_at_micros: u64,
}

impl PendingDelivery {
    fn idle_for(&self, now_micros: u64) -> Duration {
        Duration::from_micros(now_micros.saturating_sub(self.delivered_at_micros))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct GroupState {
    last_delivered: u64,
    pending: BTreeMap<u64, PendingDelivery>,
}

struct Backing {
    path: PathBuf,
    groups_path: PathBuf,
    file: File,
}

pub struct EventStream {
    backing: Option<Backing>,
    entries: Vec<StreamEntry>,
    groups: BTreeMap<String, GroupState>,
}

impl EventStream {
    /// A stream that lives only as long as the process
    pub fn in_memory() -> Self {
        Self {
            backing: None,
            entries: Vec::new(),
            groups: BTreeMap::new(),
        }
    }

    /// Open or create a file-backed stream
    ///
    /// Replays valid entries and stops at the first torn or corrupt line;
    /// anything after it is truncated so new appends continue the sequence.
    pub fn open(path: &Path) -> Result<Self, StreamError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let (entries, valid_len) = if path.exists() {
            Self::scan(path)?
        } else {
            (Vec::new(), 0)
        };

        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let file_len = file.metadata()?.len();
        if file_len > valid_len {
            tracing::warn!(
                path = %path.display(),
                kept = entries.len(),
                dropped_bytes = file_len - valid_len,
                "truncating corrupt stream tail"
            );
            file.set_len(valid_len)?;
        }

        let groups_path = path.with_extension("groups.json");
        let mut groups: BTreeMap<String, GroupState> = if groups_path.exists() {
            serde_json::from_str(&std::fs::read_to_string(&groups_path)?)?
        } else {
            BTreeMap::new()
        };

        // Offsets may point past a truncated tail
        let total = entries.len() as u64;
        for state in groups.values_mut() {
            state.last_delivered = state.last_delivered.min(total);
            state.pending.retain(|id, _| (1..=total).contains(id));
        }

        tracing::debug!(path = %path.display(), entries = total, groups = groups.len(), "stream opened");

        Ok(Self {
            backing: Some(Backing {
                path: path.to_path_buf(),
                groups_path,
                file,
            }),
            entries,
            groups,
        })
    }

    /// Read the valid prefix of a stream file, returning it with its byte length
    fn scan(path: &Path) -> Result<(Vec<StreamEntry>, u64), StreamError> {
        let bytes = std::fs::read(path)?;
        let mut entries: Vec<StreamEntry> = Vec::new();
        let mut valid_len = 0u64;
        let mut rest = &bytes[..];

        while let Some(pos) = rest.iter().position(|b| *b == b'\n') {
            let line = &rest[..pos];
            rest = &rest[pos + 1..];

            if line.is_empty() {
                valid_len += 1;
                continue;
            }

            let expected = entries.len() as u64 + 1;
            let parsed = std::str::from_utf8(line)
                .ok()
                .and_then(|l| StreamEntry::from_line(l).ok());
            match parsed {
                Some(entry) if entry.verify() && entry.id == expected => {
                    entries.push(entry);
                    valid_len += pos as u64 + 1;
                }
                _ => break,
            }
        }

        Ok((entries, valid_len))
    }

    pub fn path(&self) -> Option<&Path> {
        self.backing.as_ref().map(|b| b.path.as_path())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Append a record, returning its stream id
    pub fn append(&mut self, record: StreamRecord) -> Result<u64, StreamError> {
        let id = self.entries.len() as u64 + 1;
        let entry = StreamEntry::new(id, record);

        if let Some(backing) = &mut self.backing {
            let mut line = entry.to_line()?;
            line.push('\n');
            backing.file.write_all(line.as_bytes())?;
            backing.file.sync_all()?;
        }

        self.entries.push(entry);
        Ok(id)
    }

    /// Entries with ids in `from..from + count`, independent of any group
    pub fn range(&self, from: u64, count: usize) -> Vec<StreamEntry> {
        let start = from.saturating_sub(1) as usize;
        self.entries.iter().skip(start).take(count).cloned().collect()
    }

    /// Create a consumer group. Returns false if it already exists.
    pub fn create_group(&mut self, group: &str, start: StartPosition) -> Result<bool, StreamError> {
        if self.groups.contains_key(group) {
            return Ok(false);
        }
        let last_delivered = match start {
            StartPosition::Beginning => 0,
            StartPosition::Latest => self.entries.len() as u64,
        };
        self.groups.insert(
            group.to_string(),
            GroupState {
                last_delivered,
                pending: BTreeMap::new(),
            },
        );
        self.persist_groups()?;
        Ok(true)
    }

    pub fn groups(&self) -> Vec<String> {
        self.groups.keys().cloned().collect()
    }

    /// Hand up to `count` undelivered entries to `consumer`.
    ///
    /// Each entry goes to exactly one consumer of the group and stays
    /// pending until acknowledged.
    pub fn read_group(
        &mut self,
        group: &str,
        consumer: &str,
        count: usize,
        now_micros: u64,
    ) -> Result<Vec<StreamEntry>, StreamError> {
        let total = self.entries.len() as u64;
        let state = self
            .groups
            .get_mut(group)
            .ok_or_else(|| StreamError::UnknownGroup(group.to_string()))?;

        let start = state.last_delivered;
        let end = start.saturating_add(count as u64).min(total);
        let batch: Vec<StreamEntry> = self.entries[start as usize..end as usize].to_vec();

        for entry in &batch {
            state.pending.insert(
                entry.id,
                PendingDelivery {
                    consumer: consumer.to_string(),
                    deliveries: 1,
                    delivered_at_micros: now_micros,
                },
            );
        }
        state.last_delivered = end;

        if !batch.is_empty() {
            self.persist_groups()?;
        }
        Ok(batch)
    }

    /// Take over pending entries of a group and return them for redelivery
    ///
    /// An entry is claimed when it is already owned by `consumer`, or when it
    /// has been pending for at least `min_idle`. Entries another consumer is
    /// still working on are left alone.
    pub fn claim_pending(
        &mut self,
        group: &str,
        consumer: &str,
        min_idle: Duration,
        now_micros: u64,
    ) -> Result<Vec<StreamEntry>, StreamError> {
        let state = self
            .groups
            .get_mut(group)
            .ok_or_else(|| StreamError::UnknownGroup(group.to_string()))?;

        let mut claimed = Vec::new();
        for (id, delivery) in state.pending.iter_mut() {
            if delivery.consumer != consumer && delivery.idle_for(now_micros) < min_idle {
                continue;
            }
            let Some(entry) = id
                .checked_sub(1)
                .and_then(|index| self.entries.get(index as usize))
            else {
                continue;
            };
            delivery.consumer = consumer.to_string();
            delivery.deliveries = delivery.deliveries.saturating_add(1);
            delivery.delivered_at_micros = now_micros;
            claimed.push(entry.clone());
        }

        if !claimed.is_empty() {
            self.persist_groups()?;
        }
        Ok(claimed)
    }

    /// Acknowledge entries for a group, returning how many were pending
    pub fn ack(&mut self, group: &str, ids: &[u64]) -> Result<usize, StreamError> {
        let state = self
            .groups
            .get_mut(group)
            .ok_or_else(|| StreamError::UnknownGroup(group.to_string()))?;

        let acked = ids
            .iter()
            .filter(|id| state.pending.remove(id).is_some())
            .count();

        if acked > 0 {
            self.persist_groups()?;
        }
        Ok(acked)
    }

    /// Delivered but unacknowledged entries
    pub fn pending(&self, group: &str) -> Result<usize, StreamError> {
        self.group(group).map(|s| s.pending.len())
    }

    pub fn pending_deliveries(
        &self,
        group: &str,
    ) -> Result<BTreeMap<u64, PendingDelivery>, StreamError> {
        self.group(group).map(|s| s.pending.clone())
    }

    /// Entries not yet handed to any consumer of the group
    pub fn lag(&self, group: &str) -> Result<u64, StreamError> {
        let total = self.entries.len() as u64;
        self.group(group)
            .map(|s| total.saturating_sub(s.last_delivered))
    }

    fn group(&self, group: &str) -> Result<&GroupState, StreamError> {
        self.groups
            .get(group)
            .ok_or_else(|| StreamError::UnknownGroup(group.to_string()))
    }

    fn persist_groups(&self) -> Result<(), StreamError> {
        let Some(backing) = &self.backing else {
            return Ok(());
        };
        let json = serde_json::to_string(&self.groups)?;
        let tmp = backing.groups_path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &backing.groups_path)?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "stream_tests.rs"]
mod tests;
