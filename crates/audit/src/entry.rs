// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Audit entries

use chrono::{DateTime, Utc};
use rl_core::{ExecutionContext, Severity};
use serde::{Deserialize, Serialize};
use std::fmt;

/// `previous_hash` of the first entry in a chain
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    UserLogin,
    UserLogout,
    TradeExecuted,
    PositionClosed,
    RiskLimitBreached,
    ChallengeCompleted,
    PaymentProcessed,
    ConfigurationChanged,
    DataAccess,
    SecurityAlert,
    SystemEvent,
}

impl fmt::Display for AuditEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AuditEventType::UserLogin => "user_login",
            AuditEventType::UserLogout => "user_logout",
            AuditEventType::TradeExecuted => "trade_executed",
            AuditEventType::PositionClosed => "position_closed",
            AuditEventType::RiskLimitBreached => "risk_limit_breached",
            AuditEventType::ChallengeCompleted => "challenge_completed",
            AuditEventType::PaymentProcessed => "payment_processed",
            AuditEventType::ConfigurationChanged => "configuration_changed",
            AuditEventType::DataAccess => "data_access",
            AuditEventType::SecurityAlert => "security_alert",
            AuditEventType::SystemEvent => "system_event",
        };
        f.write_str(s)
    }
}

/// One link in the audit chain. Never mutated after it is appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: String,
    /// Position in the chain, starting at 1
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
    pub event_type: AuditEventType,
    pub severity: Severity,
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    pub correlation_id: Option<String>,
    pub resource_type: Option<String>,
    pub resource_id: Option<String>,
    pub message: String,
    pub details: serde_json::Value,
    pub previous_hash: String,
    pub integrity_hash: String,
}

/// The caller-supplied part of an entry, before it is chained
#[derive(Debug, Clone, PartialEq)]
pub struct AuditDraft {
    pub event_type: AuditEventType,
    pub severity: Severity,
    pub message: String,
    pub details: serde_json::Value,
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    pub correlation_id: Option<String>,
    pub resource_type: Option<String>,
    pub resource_id: Option<String>,
}

impl AuditDraft {
    pub fn new(event_type: AuditEventType, message: impl Into<String>, severity: Severity) -> Self {
        Self {
            event_type,
            severity,
            message: message.into(),
            details: serde_json::Value::Object(Default::default()),
            user_id: None,
            session_id: None,
            correlation_id: None,
            resource_type: None,
            resource_id: None,
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_resource(
        mut self,
        resource_type: impl Into<String>,
        resource_id: impl Into<String>,
    ) -> Self {
        self.resource_type = Some(resource_type.into());
        self.resource_id = Some(resource_id.into());
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }

    /// Fill correlation, session and (if unset) user from a context
    pub fn with_context(mut self, context: &ExecutionContext) -> Self {
        self.correlation_id = Some(context.correlation_id().to_string());
        self.session_id = context.session_id().map(str::to_string);
        if self.user_id.is_none() {
            self.user_id = context.user_id().map(str::to_string);
        }
        self
    }
}
