// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event type pattern matching

use serde::{Deserialize, Serialize};
use std::fmt;

/// Pattern over dot-separated event types
/// Supports:
///   - Exact: "Risk.Limit.Breached.v1"
///   - Single wildcard: "Trading.*.Executed.v1" matches one segment
///   - Rest: "Risk.**" matches every risk event, "**" matches everything
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventPattern(String);

impl EventPattern {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self(pattern.into())
    }

    /// Pattern matching every event type
    pub fn any() -> Self {
        Self::new("**")
    }

    /// Check if this pattern matches an event type
    pub fn matches(&self, event_type: &str) -> bool {
        if self.0.is_empty() {
            return false;
        }

        if self.0 == "**" {
            return true;
        }

        let pattern_parts: Vec<&str> = self.0.split('.').collect();
        let event_parts: Vec<&str> = event_type.split('.').collect();

        Self::match_segments(&pattern_parts, &event_parts)
    }

    fn match_segments(pattern: &[&str], event: &[&str]) -> bool {
        match (pattern.first(), event.first()) {
            (None, None) => true,
            (Some(&"**"), _) => true,
            (Some(&"*"), Some(_)) => Self::match_segments(&pattern[1..], &event[1..]),
            (Some(p), Some(e)) if *p == *e => Self::match_segments(&pattern[1..], &event[1..]),
            _ => false,
        }
    }

    /// True when the pattern contains no wildcard segment
    pub fn is_literal(&self) -> bool {
        !self.0.split('.').any(|s| s == "*" || s == "**")
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for EventPattern {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl fmt::Display for EventPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
#[path = "pattern_tests.rs"]
mod tests;
