// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Chains every published event into the audit trail

use async_trait::async_trait;
use rl_audit::{AuditLogger, AuditStore};
use rl_core::{Clock, Event, EventWorker, ExecutionContext, HandlerError, IdGen, SystemClock, UuidIdGen};

pub struct AuditTrailWorker<S, C = SystemClock, I = UuidIdGen> {
    logger: AuditLogger<S, C, I>,
}

impl<S: AuditStore, C: Clock, I: IdGen> AuditTrailWorker<S, C, I> {
    pub fn new(logger: AuditLogger<S, C, I>) -> Self {
        Self { logger }
    }

    pub fn logger(&self) -> &AuditLogger<S, C, I> {
        &self.logger
    }
}

#[async_trait]
impl<S: AuditStore, C: Clock, I: IdGen> EventWorker for AuditTrailWorker<S, C, I> {
    fn worker_name(&self) -> &str {
        "audit-trail"
    }

    fn can_handle(&self, _event: &Event) -> bool {
        true
    }

    async fn initialize(&self) -> Result<(), HandlerError> {
        match self.logger.chain().verify().await {
            Ok(true) => Ok(()),
            Ok(false) => Err(HandlerError::permanent("audit chain failed verification")),
            Err(e) => Err(HandlerError::failed(e.to_string())),
        }
    }

    async fn process_event(
        &self,
        event: &Event,
        context: &ExecutionContext,
    ) -> Result<(), HandlerError> {
        self.logger
            .log_domain_event(event, context)
            .await
            .map(|_| ())
            .map_err(|e| HandlerError::failed(e.to_string()))
    }
}

#[cfg(test)]
#[path = "audit_trail_tests.rs"]
mod tests;
