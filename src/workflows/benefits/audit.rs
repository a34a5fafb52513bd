//! Append-only audit trail of request lifecycle events.
//!
//! Entries are kept in memory and mirrored to the `audit` tracing target so a log
//! shipper can persist them.

use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use super::domain::RequestId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    RequestSubmitted,
    InvoicesAttached,
    RequestApproved,
    RequestRejected,
}

impl AuditAction {
    pub const fn label(self) -> &'static str {
        match self {
            Self::RequestSubmitted => "request_submitted",
            Self::InvoicesAttached => "invoices_attached",
            Self::RequestApproved => "request_approved",
            Self::RequestRejected => "request_rejected",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditEntry {
    pub request_id: RequestId,
    pub actor: String,
    pub action: AuditAction,
    pub recorded_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Default)]
pub struct AuditTrail {
    entries: Mutex<Vec<AuditEntry>>,
}

impl AuditTrail {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(
        &self,
        request_id: &RequestId,
        actor: impl Into<String>,
        action: AuditAction,
        detail: Option<String>,
    ) {
        let entry = AuditEntry {
            request_id: request_id.clone(),
            actor: actor.into(),
            action,
            recorded_at: Utc::now(),
            detail,
        };

        info!(
            target: "audit",
            request_id = %entry.request_id,
            actor = %entry.actor,
            action = entry.action.label(),
            detail = entry.detail.as_deref().unwrap_or(""),
            "audit entry recorded"
        );

        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry);
    }

    /// Entries for one request in recording order.
    pub fn for_request(&self, request_id: &RequestId) -> Vec<AuditEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|entry| &entry.request_id == request_id)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
