use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::domain::{
    BenefitRequest, InvoiceReference, NewBenefitRequest, RequestId, RequestStatus, RequesterId,
    ReviewNote,
};

/// Data-layer collaborator owning request records.
#[async_trait]
pub trait RequestRepository: Send + Sync {
    /// Create a request for `requester`. A repeated idempotency key from the same
    /// requester must return the record created the first time.
    async fn create(
        &self,
        requester: &RequesterId,
        request: NewBenefitRequest,
    ) -> Result<BenefitRequest, RepositoryError>;

    async fn attach_invoices(
        &self,
        id: &RequestId,
        invoices: Vec<InvoiceReference>,
    ) -> Result<(), RepositoryError>;

    /// Move a request along its lifecycle, rejecting transitions it does not allow.
    async fn update_status(
        &self,
        id: &RequestId,
        status: RequestStatus,
        review: Option<ReviewNote>,
    ) -> Result<BenefitRequest, RepositoryError>;

    async fn fetch(&self, id: &RequestId) -> Result<Option<BenefitRequest>, RepositoryError>;

    async fn list_for_requester(
        &self,
        requester: &RequesterId,
    ) -> Result<Vec<BenefitRequest>, RepositoryError>;

    /// Oldest requests awaiting a manager decision.
    async fn pending(&self, limit: usize) -> Result<Vec<BenefitRequest>, RepositoryError>;
}

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("record violates a data constraint: {0}")]
    Constraint(String),
    #[error("cannot move request from {} to {}", .from.label(), .to.label())]
    InvalidTransition {
        from: RequestStatus,
        to: RequestStatus,
    },
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// Outbound e-mail hook (the serverless mailer in production).
#[async_trait]
pub trait NotificationPublisher: Send + Sync {
    async fn publish(&self, notification: EmailNotification) -> Result<(), NotificationError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailNotification {
    pub template: String,
    pub request_id: RequestId,
    pub recipient: NotificationRecipient,
    pub details: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "id")]
pub enum NotificationRecipient {
    Requester(RequesterId),
    ReviewQueue,
}

#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("notification transport unavailable: {0}")]
    Transport(String),
}
