// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use thiserror::Error;

/// Failure to append to or read the audit trail.
///
/// Callers treat these as fatal; an audit write is never retried silently.
#[derive(Debug, Error)]
pub enum AuditLogError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid audit key: {0}")]
    InvalidKey(String),
    #[error("corrupt audit log at line {line}: {reason}")]
    Corrupt { line: usize, reason: String },
    #[error("audit sequence gap: expected {expected}, got {actual}")]
    SequenceGap { expected: u64, actual: u64 },
}
