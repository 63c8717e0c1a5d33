// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workers for the trading platform's event catalogue

mod audit_trail;
mod notification;
mod reporting;
mod risk_alert;

pub use audit_trail::AuditTrailWorker;
pub use notification::NotificationWorker;
pub use reporting::ReportingWorker;
pub use risk_alert::RiskAlertWorker;
