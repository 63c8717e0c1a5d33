// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[parameterized(
    exact = { "Risk.Limit.Breached.v1", "Risk.Limit.Breached.v1", true },
    exact_other_version = { "Risk.Limit.Breached.v1", "Risk.Limit.Breached.v2", false },
    single_wildcard = { "Trading.*.Executed.v1", "Trading.Trade.Executed.v1", true },
    single_wildcard_too_short = { "Trading.*", "Trading.Trade.Executed.v1", false },
    rest = { "Risk.**", "Risk.Limit.Breached.v1", true },
    rest_other_domain = { "Risk.**", "Trading.Trade.Executed.v1", false },
    everything = { "**", "User.LoggedIn.v1", true },
    empty_matches_nothing = { "", "User.LoggedIn.v1", false },
    prefix_is_not_enough = { "Risk", "Risk.Limit.Breached.v1", false },
)]
fn pattern_matching(pattern: &str, event_type: &str, expected: bool) {
    assert_eq!(EventPattern::new(pattern).matches(event_type), expected);
}

#[test]
fn literal_detection() {
    assert!(EventPattern::new("User.LoggedIn.v1").is_literal());
    assert!(!EventPattern::new("User.*.v1").is_literal());
    assert!(!EventPattern::any().is_literal());
}

#[test]
fn serializes_as_plain_string() {
    let json = serde_json::to_string(&EventPattern::new("Risk.**")).unwrap();
    assert_eq!(json, "\"Risk.**\"");
}
