// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Audit logging entry point for producers

use crate::chain::AuditLogChain;
use crate::entry::{AuditDraft, AuditEventType, AuditLogEntry};
use crate::error::AuditLogError;
use crate::store::AuditStore;
use rl_core::{Clock, Event, EventPayload, ExecutionContext, IdGen, Severity, SystemClock, TradeSide, UuidIdGen};
use std::sync::Arc;

/// Shared handle for appending to an audit chain.
///
/// Every failure is logged at error level and returned; callers must not
/// continue as if the operation was audited.
pub struct AuditLogger<S, C = SystemClock, I = UuidIdGen> {
    chain: Arc<AuditLogChain<S, C, I>>,
}

impl<S, C, I> Clone for AuditLogger<S, C, I> {
    fn clone(&self) -> Self {
        Self {
            chain: Arc::clone(&self.chain),
        }
    }
}

impl<S: AuditStore, C: Clock, I: IdGen> AuditLogger<S, C, I> {
    pub fn new(chain: Arc<AuditLogChain<S, C, I>>) -> Self {
        Self { chain }
    }

    pub fn chain(&self) -> &AuditLogChain<S, C, I> {
        &self.chain
    }

    pub async fn log_event(
        &self,
        draft: AuditDraft,
        context: Option<&ExecutionContext>,
    ) -> Result<AuditLogEntry, AuditLogError> {
        let draft = match context {
            Some(ctx) => draft.with_context(ctx),
            None => draft,
        };
        let event_type = draft.event_type;

        match self.chain.append(draft).await {
            Ok(entry) => {
                tracing::debug!(
                    entry_id = %entry.id,
                    sequence = entry.sequence,
                    %event_type,
                    "audit entry appended"
                );
                Ok(entry)
            }
            Err(e) => {
                tracing::error!(%event_type, error = %e, "audit append failed");
                Err(e)
            }
        }
    }

    /// Audit a published domain event
    pub async fn log_domain_event(
        &self,
        event: &Event,
        context: &ExecutionContext,
    ) -> Result<AuditLogEntry, AuditLogError> {
        let draft = draft_for_event(event)?;
        self.log_event(draft, Some(context)).await
    }
}

/// Map a domain event onto an audit draft
pub fn draft_for_event(event: &Event) -> Result<AuditDraft, AuditLogError> {
    let details = serde_json::json!({
        "event_id": event.event_id(),
        "event_type": event.event_type(),
        "aggregate_id": event.aggregate_id(),
        "occurred_at": event.occurred_at(),
        "payload": serde_json::to_value(event.payload())?,
    });

    let draft = match event.payload() {
        EventPayload::TradeExecuted {
            account_id,
            symbol,
            side,
            quantity,
            price,
        } => {
            let side = match side {
                TradeSide::Buy => "buy",
                TradeSide::Sell => "sell",
            };
            AuditDraft::new(
                AuditEventType::TradeExecuted,
                format!("trade executed: {side} {quantity} {symbol} @ {price}"),
                Severity::Low,
            )
            .with_resource("account", account_id.as_str())
        }
        EventPayload::PositionClosed {
            account_id,
            symbol,
            realized_pnl,
        } => AuditDraft::new(
            AuditEventType::PositionClosed,
            format!("position closed: {symbol} pnl {realized_pnl}"),
            Severity::Low,
        )
        .with_resource("account", account_id.as_str()),
        EventPayload::RiskLimitBreached {
            account_id,
            limit,
            current_value,
            limit_value,
            severity,
        } => AuditDraft::new(
            AuditEventType::RiskLimitBreached,
            format!("risk limit {limit} breached: {current_value} > {limit_value}"),
            *severity,
        )
        .with_resource("account", account_id.as_str()),
        EventPayload::ChallengeCompleted {
            user_id,
            challenge_id,
            passed,
            ..
        } => AuditDraft::new(
            AuditEventType::ChallengeCompleted,
            format!(
                "challenge {challenge_id} {}",
                if *passed { "passed" } else { "failed" }
            ),
            Severity::Medium,
        )
        .with_user(user_id.as_str())
        .with_resource("challenge", challenge_id.as_str()),
        EventPayload::PaymentProcessed {
            user_id,
            payment_id,
            amount,
            currency,
        } => AuditDraft::new(
            AuditEventType::PaymentProcessed,
            format!("payment {payment_id} processed: {amount} {currency}"),
            Severity::Medium,
        )
        .with_user(user_id.as_str())
        .with_resource("payment", payment_id.as_str()),
        EventPayload::UserLoggedIn { user_id, .. } => {
            AuditDraft::new(AuditEventType::UserLogin, "user logged in", Severity::Low)
                .with_user(user_id.as_str())
        }
        EventPayload::Custom { .. } => AuditDraft::new(
            AuditEventType::SystemEvent,
            format!("{} on {}", event.event_type(), event.aggregate_id()),
            Severity::Low,
        )
        .with_resource("aggregate", event.aggregate_id()),
    };

    Ok(draft.with_details(details))
}

#[cfg(test)]
#[path = "logger_tests.rs"]
mod tests;
