// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use rl_core::{Event, ExecutionContext};
use std::io::Write as _;
use std::time::Duration;
use tempfile::TempDir;

const NOW: u64 = 1_800_000_000_000_000;
const MINUTE: Duration = Duration::from_secs(60);

fn temp_stream_path() -> (TempDir, PathBuf) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("events.jsonl");
    (dir, path)
}

fn record(n: u32) -> StreamRecord {
    StreamRecord {
        event: Event::custom("Custom.Event.v1", format!("agg-{n}"), serde_json::json!({ "n": n })),
        context: ExecutionContext::system(),
        routing_key: None,
    }
}

fn ids(entries: &[StreamEntry]) -> Vec<u64> {
    entries.iter().map(|e| e.id).collect()
}

#[test]
fn append_assigns_sequential_ids() {
    let mut stream = EventStream::in_memory();
    assert!(stream.is_empty());
    assert_eq!(stream.append(record(1)).unwrap(), 1);
    assert_eq!(stream.append(record(2)).unwrap(), 2);
    assert_eq!(stream.len(), 2);
    assert_eq!(ids(&stream.range(2, 10)), vec![2]);
}

#[test]
fn reopen_replays_entries() {
    let (_dir, path) = temp_stream_path();
    {
        let mut stream = EventStream::open(&path).unwrap();
        stream.append(record(1)).unwrap();
        stream.append(record(2)).unwrap();
    }

    let mut stream = EventStream::open(&path).unwrap();
    assert_eq!(stream.len(), 2);
    assert_eq!(stream.append(record(3)).unwrap(), 3);
    assert_eq!(stream.range(1, 1)[0].record.event.aggregate_id(), "agg-1");
}

#[test]
fn reopen_truncates_torn_tail() {
    let (_dir, path) = temp_stream_path();
    {
        let mut stream = EventStream::open(&path).unwrap();
        stream.append(record(1)).unwrap();
    }
    {
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(b"{\"id\":2,\"timestamp_mic").unwrap();
    }

    let mut stream = EventStream::open(&path).unwrap();
    assert_eq!(stream.len(), 1);
    assert_eq!(stream.append(record(2)).unwrap(), 2);
    drop(stream);

    let stream = EventStream::open(&path).unwrap();
    assert_eq!(stream.len(), 2);
}

#[test]
fn reopen_stops_at_checksum_mismatch() {
    let (_dir, path) = temp_stream_path();
    {
        let mut stream = EventStream::open(&path).unwrap();
        stream.append(record(1)).unwrap();
    }
    {
        let mut bad = StreamEntry::new(2, record(2));
        bad.checksum ^= 1;
        let third = StreamEntry::new(3, record(3));
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(file, "{}", bad.to_line().unwrap()).unwrap();
        writeln!(file, "{}", third.to_line().unwrap()).unwrap();
    }

    let stream = EventStream::open(&path).unwrap();
    assert_eq!(stream.len(), 1);
}

#[test]
fn group_delivers_each_entry_once() {
    let mut stream = EventStream::in_memory();
    for n in 1..=5 {
        stream.append(record(n)).unwrap();
    }
    assert!(stream.create_group("reporting", StartPosition::Beginning).unwrap());

    let a = stream.read_group("reporting", "bus-a", 3, NOW).unwrap();
    let b = stream.read_group("reporting", "bus-b", 3, NOW).unwrap();
    let c = stream.read_group("reporting", "bus-a", 3, NOW).unwrap();

    assert_eq!(ids(&a), vec![1, 2, 3]);
    assert_eq!(ids(&b), vec![4, 5]);
    assert!(c.is_empty());
    assert_eq!(stream.pending("reporting").unwrap(), 5);
    assert_eq!(stream.lag("reporting").unwrap(), 0);
}

#[test]
fn groups_are_independent() {
    let mut stream = EventStream::in_memory();
    stream.append(record(1)).unwrap();
    stream.create_group("audit", StartPosition::Beginning).unwrap();
    stream.create_group("reporting", StartPosition::Beginning).unwrap();

    assert_eq!(ids(&stream.read_group("audit", "c", 10, NOW).unwrap()), vec![1]);
    assert_eq!(ids(&stream.read_group("reporting", "c", 10, NOW).unwrap()), vec![1]);
}

#[test]
fn latest_skips_existing_entries() {
    let mut stream = EventStream::in_memory();
    stream.append(record(1)).unwrap();
    stream.create_group("alerts", StartPosition::Latest).unwrap();
    stream.append(record(2)).unwrap();

    assert_eq!(stream.lag("alerts").unwrap(), 1);
    assert_eq!(ids(&stream.read_group("alerts", "c", 10, NOW).unwrap()), vec![2]);
}

#[test]
fn create_group_twice_keeps_offsets() {
    let mut stream = EventStream::in_memory();
    stream.append(record(1)).unwrap();
    stream.create_group("g", StartPosition::Beginning).unwrap();
    stream.read_group("g", "c", 1, NOW).unwrap();

    assert!(!stream.create_group("g", StartPosition::Beginning).unwrap());
    assert_eq!(stream.lag("g").unwrap(), 0);
}

#[test]
fn ack_clears_pending() {
    let mut stream = EventStream::in_memory();
    stream.append(record(1)).unwrap();
    stream.append(record(2)).unwrap();
    stream.create_group("g", StartPosition::Beginning).unwrap();
    stream.read_group("g", "c", 10, NOW).unwrap();

    assert_eq!(stream.ack("g", &[1, 1, 99]).unwrap(), 1);
    assert_eq!(stream.pending("g").unwrap(), 1);
    assert_eq!(stream.pending_deliveries("g").unwrap().keys().copied().collect::<Vec<_>>(), vec![2]);
}

#[test]
fn unknown_group_is_an_error() {
    let mut stream = EventStream::in_memory();
    assert!(matches!(
        stream.read_group("nope", "c", 1, NOW),
        Err(StreamError::UnknownGroup(_))
    ));
    assert!(stream.lag("nope").is_err());
    assert!(stream.ack("nope", &[1]).is_err());
}

#[test]
fn offsets_survive_reopen() {
    let (_dir, path) = temp_stream_path();
    {
        let mut stream = EventStream::open(&path).unwrap();
        for n in 1..=3 {
            stream.append(record(n)).unwrap();
        }
        stream.create_group("g", StartPosition::Beginning).unwrap();
        stream.read_group("g", "c", 2, NOW).unwrap();
        stream.ack("g", &[1]).unwrap();
    }

    let mut stream = EventStream::open(&path).unwrap();
    assert_eq!(stream.groups(), vec!["g".to_string()]);
    assert_eq!(stream.pending("g").unwrap(), 1);
    assert_eq!(stream.lag("g").unwrap(), 1);

    let later = NOW + MINUTE.as_micros() as u64;
    let claimed = stream.claim_pending("g", "restarted", MINUTE, later).unwrap();
    assert_eq!(ids(&claimed), vec![2]);
    let pending = stream.pending_deliveries("g").unwrap();
    assert_eq!(pending[&2].consumer, "restarted");
    assert_eq!(pending[&2].deliveries, 2);
    assert_eq!(pending[&2].delivered_at_micros, later);
}

#[test]
fn entries_of_a_live_consumer_are_not_claimed() {
    let mut stream = EventStream::in_memory();
    stream.append(record(1)).unwrap();
    stream.create_group("g", StartPosition::Beginning).unwrap();
    stream.read_group("g", "bus-a", 10, NOW).unwrap();

    let soon = NOW + 5_000_000;
    assert!(stream.claim_pending("g", "bus-b", MINUTE, soon).unwrap().is_empty());
    assert_eq!(stream.pending_deliveries("g").unwrap()[&1].consumer, "bus-a");

    // The owner can always take its own entries back
    assert_eq!(ids(&stream.claim_pending("g", "bus-a", MINUTE, soon).unwrap()), vec![1]);
}

#[test]
fn claiming_restarts_the_idle_clock() {
    let mut stream = EventStream::in_memory();
    stream.append(record(1)).unwrap();
    stream.create_group("g", StartPosition::Beginning).unwrap();
    stream.read_group("g", "bus-a", 10, NOW).unwrap();

    let idle = NOW + 2 * MINUTE.as_micros() as u64;
    assert_eq!(ids(&stream.claim_pending("g", "bus-b", MINUTE, idle).unwrap()), vec![1]);
    assert!(stream.claim_pending("g", "bus-c", MINUTE, idle + 1).unwrap().is_empty());
}

#[test]
fn hand_edited_offsets_are_sanitized() {
    let (_dir, path) = temp_stream_path();
    {
        let mut stream = EventStream::open(&path).unwrap();
        stream.append(record(1)).unwrap();
    }
    std::fs::write(
        path.with_extension("groups.json"),
        r#"{"g":{"last_delivered":1,"pending":{"0":{"consumer":"x","deliveries":1},"1":{"consumer":"x","deliveries":1},"7":{"consumer":"x","deliveries":1}}}}"#,
    )
    .unwrap();

    let mut stream = EventStream::open(&path).unwrap();
    assert_eq!(stream.pending("g").unwrap(), 1);
    // Deliveries without a timestamp count as idle since the epoch
    assert_eq!(ids(&stream.claim_pending("g", "y", MINUTE, NOW).unwrap()), vec![1]);
}
