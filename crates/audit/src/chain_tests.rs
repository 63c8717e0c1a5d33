// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::entry::AuditEventType;
use crate::store::MemoryAuditStore;
use proptest::prelude::*;
use rl_core::{FakeClock, SequentialIdGen, Severity};
use std::time::Duration;

const SECRET: &[u8] = b"an-audit-key-that-is-long-enough!!";

type TestChain = AuditLogChain<MemoryAuditStore, FakeClock, SequentialIdGen>;

async fn chain_with(store: MemoryAuditStore) -> TestChain {
    AuditLogChain::open_with(
        ChainKey::new(SECRET).unwrap(),
        store,
        FakeClock::new(),
        SequentialIdGen::new("aud"),
    )
    .await
    .unwrap()
}

async fn filled_chain(n: usize) -> TestChain {
    let chain = chain_with(MemoryAuditStore::new()).await;
    for i in 0..n {
        chain.clock.advance(Duration::from_secs(1));
        let draft = AuditDraft::new(AuditEventType::DataAccess, format!("read #{i}"), Severity::Low)
            .with_user(format!("user-{}", i % 3))
            .with_resource("account", format!("acct-{i}"))
            .with_details(serde_json::json!({ "i": i }));
        chain.append(draft).await.unwrap();
    }
    chain
}

fn block_on<F: std::future::Future>(f: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(f)
}

/// Change exactly one field of an entry
fn tamper(entry: &mut AuditLogEntry, field: usize) {
    match field {
        0 => entry.id.push('x'),
        1 => entry.sequence += 1,
        2 => entry.timestamp += chrono::Duration::seconds(1),
        3 => {
            entry.event_type = if entry.event_type == AuditEventType::UserLogin {
                AuditEventType::DataAccess
            } else {
                AuditEventType::UserLogin
            }
        }
        4 => {
            entry.severity = if entry.severity == Severity::Critical {
                Severity::Low
            } else {
                Severity::Critical
            }
        }
        5 => entry.user_id = Some(format!("{}-forged", entry.user_id.clone().unwrap_or_default())),
        6 => entry.session_id = Some("forged-session".to_string()),
        7 => entry.correlation_id = Some("forged-correlation".to_string()),
        8 => entry.resource_type = Some("forged-type".to_string()),
        9 => entry.resource_id = Some(format!("{}-forged", entry.resource_id.clone().unwrap_or_default())),
        10 => entry.message.push_str(" (edited)"),
        11 => entry.details = serde_json::json!({ "forged": true }),
        12 => entry.previous_hash = GENESIS_HASH.replace('0', "1"),
        _ => entry.integrity_hash = GENESIS_HASH.replace('0', "f"),
    }
}

#[tokio::test]
async fn first_entry_links_to_genesis() {
    let chain = filled_chain(1).await;
    let entries = chain.store().entries();

    assert_eq!(entries[0].sequence, 1);
    assert_eq!(entries[0].id, "aud-1");
    assert_eq!(entries[0].previous_hash, GENESIS_HASH);
}

#[tokio::test]
async fn entries_link_to_predecessor() {
    let chain = filled_chain(4).await;
    let entries = chain.store().entries();

    for pair in entries.windows(2) {
        assert_eq!(pair[1].previous_hash, pair[0].integrity_hash);
        assert_eq!(pair[1].sequence, pair[0].sequence + 1);
    }
    assert!(chain.verify_chain_integrity(&entries));
    assert!(chain.verify().await.unwrap());
}

#[tokio::test]
async fn empty_chain_verifies() {
    let chain = filled_chain(0).await;
    assert!(chain.verify_chain_integrity(&[]));
    assert!(chain.verify().await.unwrap());
}

#[tokio::test]
async fn slices_verify_from_their_first_entry() {
    let chain = filled_chain(6).await;
    let entries = chain.store().entries();
    assert!(chain.verify_chain_integrity(&entries[3..]));
}

#[tokio::test]
async fn reordering_is_detected() {
    let chain = filled_chain(4).await;
    let mut entries = chain.store().entries();
    entries.swap(1, 2);
    assert!(!chain.verify_chain_integrity(&entries));
}

#[tokio::test]
async fn dropped_entry_is_detected() {
    let chain = filled_chain(4).await;
    let mut entries = chain.store().entries();
    entries.remove(2);
    assert!(!chain.verify_chain_integrity(&entries));
}

#[tokio::test]
async fn stored_tampering_fails_full_verification() {
    let chain = filled_chain(3).await;
    let mut entry = chain.store().entries()[1].clone();
    entry.message = "nothing to see here".to_string();
    chain.store().replace(1, entry);

    assert!(!chain.verify().await.unwrap());
}

#[tokio::test]
async fn wrong_key_fails_verification() {
    let chain = filled_chain(2).await;
    let other = ChainKey::new(b"a-completely-different-audit-key!!").unwrap();
    assert!(!verify_chain_integrity(&other, &chain.store().entries()));
}

#[tokio::test]
async fn reopened_chain_continues_sequence() {
    let chain = filled_chain(2).await;
    let store = chain.store().clone();
    drop(chain);

    let reopened = chain_with(store.clone()).await;
    let entry = reopened
        .append(AuditDraft::new(AuditEventType::SystemEvent, "restart", Severity::Low))
        .await
        .unwrap();

    assert_eq!(entry.sequence, 3);
    assert_eq!(entry.previous_hash, store.entries()[1].integrity_hash);
    assert!(reopened.verify().await.unwrap());
}

proptest! {
    #[test]
    fn any_single_field_change_is_detected(n in 1usize..8, k_seed in any::<usize>(), field in 0usize..14) {
        let chain = block_on(filled_chain(n));
        let mut entries = chain.store().entries();
        prop_assert!(chain.verify_chain_integrity(&entries));

        let k = k_seed % n;
        tamper(&mut entries[k], field);
        prop_assert!(!chain.verify_chain_integrity(&entries));
    }
}
