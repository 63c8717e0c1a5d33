// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Domain events
//!
//! An [`Event`] is an immutable record of something that happened. Its
//! `event_type` is a stable, versioned, dot-separated tag (for example
//! `"Trading.Trade.Executed.v1"`) and is what workers route on. Type-specific
//! fields live in the closed [`EventPayload`] enum and are fixed at
//! construction.
//!
//! Two events are equal only when their `event_id`s are equal.

use crate::clock::Clock;
use crate::id::IdGen;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use thiserror::Error;

/// Versioned event type tags produced by the platform
pub mod event_types {
    pub const TRADE_EXECUTED: &str = "Trading.Trade.Executed.v1";
    pub const POSITION_CLOSED: &str = "Trading.Position.Closed.v1";
    pub const RISK_LIMIT_BREACHED: &str = "Risk.Limit.Breached.v1";
    pub const CHALLENGE_COMPLETED: &str = "Challenge.Completed.v1";
    pub const PAYMENT_PROCESSED: &str = "Payment.Processed.v1";
    pub const USER_LOGGED_IN: &str = "User.LoggedIn.v1";
    pub const CUSTOM: &str = "Custom.Event.v1";
}

/// Severity attached to risk events and audit entries
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    Buy,
    Sell,
}

/// Type-specific event fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventPayload {
    TradeExecuted {
        account_id: String,
        symbol: String,
        side: TradeSide,
        quantity: f64,
        price: f64,
    },
    PositionClosed {
        account_id: String,
        symbol: String,
        realized_pnl: f64,
    },
    RiskLimitBreached {
        account_id: String,
        limit: String,
        current_value: f64,
        limit_value: f64,
        severity: Severity,
    },
    ChallengeCompleted {
        user_id: String,
        challenge_id: String,
        passed: bool,
        final_balance: f64,
    },
    PaymentProcessed {
        user_id: String,
        payment_id: String,
        amount: f64,
        currency: String,
    },
    UserLoggedIn {
        user_id: String,
        ip_address: Option<String>,
    },
    /// Escape hatch for producers outside the catalogue
    Custom { data: serde_json::Value },
}

impl EventPayload {
    /// The versioned type tag this payload is published under
    pub fn event_type(&self) -> &'static str {
        match self {
            EventPayload::TradeExecuted { .. } => event_types::TRADE_EXECUTED,
            EventPayload::PositionClosed { .. } => event_types::POSITION_CLOSED,
            EventPayload::RiskLimitBreached { .. } => event_types::RISK_LIMIT_BREACHED,
            EventPayload::ChallengeCompleted { .. } => event_types::CHALLENGE_COMPLETED,
            EventPayload::PaymentProcessed { .. } => event_types::PAYMENT_PROCESSED,
            EventPayload::UserLoggedIn { .. } => event_types::USER_LOGGED_IN,
            EventPayload::Custom { .. } => event_types::CUSTOM,
        }
    }

    /// The user the payload concerns, if any
    pub fn user_id(&self) -> Option<&str> {
        match self {
            EventPayload::ChallengeCompleted { user_id, .. }
            | EventPayload::PaymentProcessed { user_id, .. }
            | EventPayload::UserLoggedIn { user_id, .. } => Some(user_id),
            _ => None,
        }
    }
}

/// Reasons an event is refused at the producer boundary
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EventValidationError {
    #[error("event {0} has an empty event_type")]
    MissingEventType(String),
    #[error("event {0} has an empty aggregate_id")]
    MissingAggregateId(String),
}

/// Immutable record of something that happened
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    event_id: String,
    event_type: String,
    aggregate_id: String,
    occurred_at: DateTime<Utc>,
    payload: EventPayload,
}

impl Event {
    /// Create an event with a random id, stamped now
    pub fn new(aggregate_id: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            event_type: payload.event_type().to_string(),
            aggregate_id: aggregate_id.into(),
            occurred_at: Utc::now(),
            payload,
        }
    }

    /// Create an event using injected id and time sources
    pub fn create(
        ids: &impl IdGen,
        clock: &impl Clock,
        aggregate_id: impl Into<String>,
        payload: EventPayload,
    ) -> Self {
        Self {
            event_id: ids.next(),
            event_type: payload.event_type().to_string(),
            aggregate_id: aggregate_id.into(),
            occurred_at: clock.utc_now(),
            payload,
        }
    }

    /// Create an event under an arbitrary type tag
    pub fn custom(
        event_type: impl Into<String>,
        aggregate_id: impl Into<String>,
        data: serde_json::Value,
    ) -> Self {
        Self {
            event_type: event_type.into(),
            ..Self::new(aggregate_id, EventPayload::Custom { data })
        }
    }

    /// Replace the generated id (construction time only)
    pub fn with_id(mut self, event_id: impl Into<String>) -> Self {
        self.event_id = event_id.into();
        self
    }

    /// Replace the occurrence timestamp (construction time only)
    pub fn with_occurred_at(mut self, occurred_at: DateTime<Utc>) -> Self {
        self.occurred_at = occurred_at;
        self
    }

    pub fn event_id(&self) -> &str {
        &self.event_id
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn aggregate_id(&self) -> &str {
        &self.aggregate_id
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    pub fn payload(&self) -> &EventPayload {
        &self.payload
    }

    /// Severity carried by the payload, if the payload has one
    pub fn severity(&self) -> Option<Severity> {
        match &self.payload {
            EventPayload::RiskLimitBreached { severity, .. } => Some(*severity),
            _ => None,
        }
    }

    /// Check the fields the bus relies on for routing
    pub fn validate(&self) -> Result<(), EventValidationError> {
        if self.event_type.trim().is_empty() {
            return Err(EventValidationError::MissingEventType(
                self.event_id.clone(),
            ));
        }
        if self.aggregate_id.trim().is_empty() {
            return Err(EventValidationError::MissingAggregateId(
                self.event_id.clone(),
            ));
        }
        Ok(())
    }
}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.event_id == other.event_id
    }
}

impl Eq for Event {}

impl Hash for Event {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.event_id.hash(state);
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.event_type, self.event_id)
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
