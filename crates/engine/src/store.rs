// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory event store with type and aggregate indexes

use chrono::{DateTime, Utc};
use rl_core::{Event, ExecutionContext, StoreConfig};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Mutex;

/// A published event with the context it was published under
#[derive(Debug, Clone)]
pub struct StoredEvent {
    pub sequence: u64,
    pub event: Event,
    pub context: ExecutionContext,
}

/// Selects stored events for replay; unset fields match everything
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplayFilter {
    /// Only events that occurred at or after this instant
    pub from: Option<DateTime<Utc>>,
    pub event_type: Option<String>,
    pub aggregate_id: Option<String>,
}

impl ReplayFilter {
    pub fn matches(&self, event: &Event) -> bool {
        self.from.map_or(true, |from| event.occurred_at() >= from)
            && self
                .event_type
                .as_deref()
                .map_or(true, |t| t == event.event_type())
            && self
                .aggregate_id
                .as_deref()
                .map_or(true, |a| a == event.aggregate_id())
    }
}

#[derive(Default)]
struct StoreInner {
    next_sequence: u64,
    events: BTreeMap<u64, StoredEvent>,
    by_id: HashMap<String, u64>,
    by_type: HashMap<String, BTreeSet<u64>>,
    by_aggregate: HashMap<String, BTreeSet<u64>>,
}

impl StoreInner {
    fn collect(&self, sequences: impl IntoIterator<Item = u64>) -> Vec<StoredEvent> {
        sequences
            .into_iter()
            .filter_map(|seq| self.events.get(&seq).cloned())
            .collect()
    }

    fn evict_oldest(&mut self, count: usize) {
        let oldest: Vec<u64> = self.events.keys().take(count).copied().collect();
        for seq in oldest {
            let Some(stored) = self.events.remove(&seq) else {
                continue;
            };
            self.by_id.remove(stored.event.event_id());
            unindex(&mut self.by_type, stored.event.event_type(), seq);
            unindex(&mut self.by_aggregate, stored.event.aggregate_id(), seq);
        }
    }
}

fn unindex(index: &mut HashMap<String, BTreeSet<u64>>, key: &str, seq: u64) {
    if let Some(set) = index.get_mut(key) {
        set.remove(&seq);
        if set.is_empty() {
            index.remove(key);
        }
    }
}

/// Bounded to `max_events`; once exceeded the oldest tenth is evicted.
pub struct EventStore {
    inner: Mutex<StoreInner>,
    max_events: usize,
}

impl EventStore {
    pub fn new(max_events: usize) -> Self {
        Self {
            inner: Mutex::new(StoreInner::default()),
            max_events: max_events.max(1),
        }
    }

    pub fn from_config(config: &StoreConfig) -> Self {
        Self::new(config.max_events)
    }

    /// Store an event. Returns false if its id is already stored.
    pub fn append(&self, event: &Event, context: &ExecutionContext) -> bool {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if inner.by_id.contains_key(event.event_id()) {
            return false;
        }

        inner.next_sequence += 1;
        let seq = inner.next_sequence;
        inner.by_id.insert(event.event_id().to_string(), seq);
        inner
            .by_type
            .entry(event.event_type().to_string())
            .or_default()
            .insert(seq);
        inner
            .by_aggregate
            .entry(event.aggregate_id().to_string())
            .or_default()
            .insert(seq);
        inner.events.insert(
            seq,
            StoredEvent {
                sequence: seq,
                event: event.clone(),
                context: context.clone(),
            },
        );

        if inner.events.len() > self.max_events {
            let evict = (self.max_events / 10).max(1);
            inner.evict_oldest(evict);
            tracing::debug!(evicted = evict, "event store over capacity");
        }
        true
    }

    pub fn get(&self, event_id: &str) -> Option<StoredEvent> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let seq = inner.by_id.get(event_id)?;
        inner.events.get(seq).cloned()
    }

    pub fn by_type(&self, event_type: &str) -> Vec<StoredEvent> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        match inner.by_type.get(event_type) {
            Some(seqs) => inner.collect(seqs.iter().copied()),
            None => Vec::new(),
        }
    }

    pub fn by_aggregate(&self, aggregate_id: &str) -> Vec<StoredEvent> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        match inner.by_aggregate.get(aggregate_id) {
            Some(seqs) => inner.collect(seqs.iter().copied()),
            None => Vec::new(),
        }
    }

    /// Events matching `filter`, in publish order
    pub fn query(&self, filter: &ReplayFilter) -> Vec<StoredEvent> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let candidates: Vec<u64> = if let Some(aggregate_id) = &filter.aggregate_id {
            inner
                .by_aggregate
                .get(aggregate_id)
                .map(|s| s.iter().copied().collect())
                .unwrap_or_default()
        } else if let Some(event_type) = &filter.event_type {
            inner
                .by_type
                .get(event_type)
                .map(|s| s.iter().copied().collect())
                .unwrap_or_default()
        } else {
            inner.events.keys().copied().collect()
        };

        inner
            .collect(candidates)
            .into_iter()
            .filter(|stored| filter.matches(&stored.event))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .events
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for EventStore {
    fn default() -> Self {
        Self::from_config(&StoreConfig::default())
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
