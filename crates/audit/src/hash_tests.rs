// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::entry::GENESIS_HASH;
use yare::parameterized;

const SECRET: &[u8] = b"an-audit-key-that-is-long-enough!!";

fn entry() -> AuditLogEntry {
    AuditLogEntry {
        id: "aud-1".to_string(),
        sequence: 1,
        timestamp: "2026-03-01T12:00:00Z".parse().unwrap(),
        event_type: AuditEventType::UserLogin,
        severity: Severity::Low,
        user_id: Some("user-1".to_string()),
        session_id: None,
        correlation_id: Some("req-1".to_string()),
        resource_type: None,
        resource_id: None,
        message: "user logged in".to_string(),
        details: serde_json::json!({ "ip": "10.0.0.1" }),
        previous_hash: GENESIS_HASH.to_string(),
        integrity_hash: String::new(),
    }
}

#[test]
fn short_keys_are_rejected() {
    assert!(matches!(
        ChainKey::new(b"short"),
        Err(AuditLogError::InvalidKey(_))
    ));
}

#[test]
fn seal_is_deterministic_hex() {
    let key = ChainKey::new(SECRET).unwrap();
    let a = key.seal(&entry()).unwrap();
    let b = key.seal(&entry()).unwrap();
    assert_eq!(a, b);
    assert_eq!(a.len(), 64);
    assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
}

#[test]
fn seal_ignores_existing_hash() {
    let key = ChainKey::new(SECRET).unwrap();
    let mut sealed = entry();
    sealed.integrity_hash = key.seal(&sealed).unwrap();
    assert_eq!(key.seal(&sealed).unwrap(), sealed.integrity_hash);
    assert!(key.verify(&sealed));
}

#[test]
fn different_keys_disagree() {
    let mut sealed = entry();
    sealed.integrity_hash = ChainKey::new(SECRET).unwrap().seal(&sealed).unwrap();
    let other = ChainKey::new(b"a-completely-different-audit-key!!").unwrap();
    assert!(!other.verify(&sealed));
}

#[parameterized(
    empty = { "" },
    odd_length = { "abc" },
    not_hex = { "zz" },
    wrong_value = { "00" },
)]
fn malformed_hashes_fail(hash: &str) {
    let key = ChainKey::new(SECRET).unwrap();
    let mut sealed = entry();
    sealed.integrity_hash = hash.to_string();
    assert!(!key.verify(&sealed));
}

#[test]
fn hex_roundtrip() {
    let bytes = [0u8, 1, 0xab, 0xff];
    assert_eq!(hex_decode(&hex_encode(&bytes)).unwrap(), bytes.to_vec());
}
