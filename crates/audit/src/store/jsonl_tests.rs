// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::chain::AuditLogChain;
use crate::entry::{AuditDraft, AuditEventType};
use crate::hash::ChainKey;
use rl_core::Severity;
use tempfile::TempDir;
use tokio::io::AsyncWriteExt;

const SECRET: &[u8] = b"an-audit-key-that-is-long-enough!!";

async fn append_n(store: JsonlAuditStore, n: usize) {
    let chain = AuditLogChain::open(ChainKey::new(SECRET).unwrap(), store)
        .await
        .unwrap();
    for i in 0..n {
        chain
            .append(AuditDraft::new(AuditEventType::DataAccess, format!("read {i}"), Severity::Low))
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn reopen_restores_entries_and_verifies() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("audit/audit.jsonl");

    append_n(JsonlAuditStore::open(&path).unwrap(), 3).await;

    let store = JsonlAuditStore::open(&path).unwrap();
    assert_eq!(store.count().await.unwrap(), 3);
    assert_eq!(store.last().await.unwrap().unwrap().sequence, 3);
    assert_eq!(store.fetch_range(2, 10).await.unwrap().len(), 2);

    let chain = AuditLogChain::open(ChainKey::new(SECRET).unwrap(), store)
        .await
        .unwrap();
    assert!(chain.verify().await.unwrap());
}

#[tokio::test]
async fn edited_file_fails_verification() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("audit.jsonl");
    append_n(JsonlAuditStore::open(&path).unwrap(), 2).await;

    let contents = std::fs::read_to_string(&path).unwrap();
    std::fs::write(&path, contents.replace("read 1", "read 9")).unwrap();

    let chain = AuditLogChain::open(
        ChainKey::new(SECRET).unwrap(),
        JsonlAuditStore::open(&path).unwrap(),
    )
    .await
    .unwrap();
    assert!(!chain.verify().await.unwrap());
}

#[test]
fn unparseable_line_is_reported() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("audit.jsonl");
    std::fs::write(&path, "{\"id\":\n").unwrap();

    assert!(matches!(
        JsonlAuditStore::open(&path),
        Err(AuditLogError::Corrupt { line: 1, .. })
    ));
}

#[tokio::test]
async fn missing_line_is_reported_as_gap() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("audit.jsonl");
    append_n(JsonlAuditStore::open(&path).unwrap(), 3).await;

    let contents = std::fs::read_to_string(&path).unwrap();
    let kept: Vec<&str> = contents.lines().enumerate().filter(|(i, _)| *i != 1).map(|(_, l)| l).collect();
    std::fs::write(&path, kept.join("\n") + "\n").unwrap();

    assert!(matches!(
        JsonlAuditStore::open(&path),
        Err(AuditLogError::SequenceGap { expected: 2, actual: 3 })
    ));
}

#[tokio::test]
async fn torn_append_is_cut_off_and_file_reopens() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("audit.jsonl");
    let store = JsonlAuditStore::open(&path).unwrap();
    append_n(store.clone(), 2).await;
    let intact = std::fs::metadata(&path).unwrap().len();

    {
        let mut inner = store.inner.lock().await;
        inner.file.write_all(b"{\"id\":\"half").await.unwrap();
        inner.file.flush().await.unwrap();
        inner.rollback().await;
    }
    assert_eq!(std::fs::metadata(&path).unwrap().len(), intact);

    append_n(store, 1).await;
    let reopened = JsonlAuditStore::open(&path).unwrap();
    assert_eq!(reopened.count().await.unwrap(), 3);
}
