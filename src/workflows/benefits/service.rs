use std::collections::BTreeMap;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::audit::{AuditAction, AuditEntry, AuditTrail};
use super::dependents::DependentListEditor;
use super::domain::{
    BenefitRequest, DependentDraft, IdempotencyKey, InvoiceMetadata, RequestId, RequestKind,
    RequestStatus, RequesterId, ReviewNote, ReviewerId,
};
use super::invoices::{InvoiceFile, PendingInvoice};
use super::repository::{
    EmailNotification, NotificationPublisher, NotificationRecipient, RepositoryError,
    RequestRepository,
};
use super::storage::{ObjectStorage, UploadGateway};
use super::validation::{FieldError, FormField, SubmissionForm, ValidationErrors};
use super::workflow::{
    SubmissionContext, SubmissionError, SubmissionFeedback, SubmissionReceipt, SubmissionWorkflow,
    TracingFeedback,
};

/// Default page size for the reviewer queue.
pub const DEFAULT_PENDING_LIMIT: usize = 50;

/// Everything a requester reports for one submission, already in editor form.
#[derive(Debug, Clone, Default)]
pub struct SubmissionDraft {
    pub form: SubmissionForm,
    pub dependents: Vec<DependentDraft>,
    pub invoices: Vec<PendingInvoice>,
    pub idempotency_key: Option<IdempotencyKey>,
}

/// JSON submission body; invoice contents travel base64 encoded.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubmissionPayload {
    #[serde(default)]
    pub kind: RequestKind,
    #[serde(default)]
    pub amount: Option<Decimal>,
    #[serde(default)]
    pub polo: String,
    #[serde(default)]
    pub cpf: String,
    #[serde(default)]
    pub salary: Option<Decimal>,
    #[serde(default)]
    pub dependents: Vec<DependentDraft>,
    #[serde(default)]
    pub invoices: Vec<InvoicePayload>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InvoicePayload {
    pub file_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Base64 file body; absent for entries that only carry metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_path: Option<String>,
}

impl SubmissionPayload {
    /// Decode invoice bodies, reporting every undecodable entry by position.
    pub fn into_draft(
        self,
        idempotency_key: Option<IdempotencyKey>,
    ) -> Result<SubmissionDraft, ValidationErrors> {
        let mut errors = Vec::new();
        let mut invoices = Vec::with_capacity(self.invoices.len());

        for (index, invoice) in self.invoices.into_iter().enumerate() {
            let Some(encoded) = invoice.content else {
                invoices.push(PendingInvoice {
                    file: None,
                    metadata: InvoiceMetadata {
                        file_name: invoice.file_name,
                        description: invoice.description,
                        storage_path: invoice.storage_path,
                    },
                });
                continue;
            };

            match BASE64.decode(encoded.trim()) {
                Ok(content) => {
                    let content_type = invoice
                        .content_type
                        .unwrap_or_else(|| mime::APPLICATION_OCTET_STREAM.to_string());
                    let file = InvoiceFile::new(invoice.file_name, content_type, content);
                    invoices.push(PendingInvoice::with_file(file, invoice.description));
                }
                Err(err) => errors.push(FieldError::new(
                    FormField::InvoiceContent(index),
                    format!("invoice content is not valid base64: {err}"),
                )),
            }
        }

        if !errors.is_empty() {
            return Err(ValidationErrors { errors });
        }

        Ok(SubmissionDraft {
            form: SubmissionForm {
                kind: self.kind,
                amount: self.amount,
                polo: self.polo,
                cpf: self.cpf,
                salary: self.salary,
            },
            dependents: self.dependents,
            invoices,
            idempotency_key,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewOutcome {
    Approve,
    Reject,
}

impl ReviewOutcome {
    pub const fn target_status(self) -> RequestStatus {
        match self {
            Self::Approve => RequestStatus::Approved,
            Self::Reject => RequestStatus::Rejected,
        }
    }
}

/// Manager decision on a pending request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewDecision {
    pub outcome: ReviewOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ReviewError {
    #[error("a rejection needs a note for the requester")]
    MissingRejectionNote,
    #[error("request {id} is {} and cannot be reviewed", .status.label())]
    NotPending { id: RequestId, status: RequestStatus },
}

/// Service composing the submission workflow, review decisions and the audit trail.
pub struct BenefitRequestService<R, S, N> {
    repository: Arc<R>,
    gateway: Arc<UploadGateway<S>>,
    notifications: Arc<N>,
    audit: Arc<AuditTrail>,
    feedback: Arc<dyn SubmissionFeedback>,
}

impl<R, S, N> BenefitRequestService<R, S, N>
where
    R: RequestRepository + 'static,
    S: ObjectStorage + 'static,
    N: NotificationPublisher + 'static,
{
    pub fn new(
        repository: Arc<R>,
        gateway: Arc<UploadGateway<S>>,
        notifications: Arc<N>,
        audit: Arc<AuditTrail>,
    ) -> Self {
        Self {
            repository,
            gateway,
            notifications,
            audit,
            feedback: Arc::new(TracingFeedback),
        }
    }

    pub fn with_feedback(mut self, feedback: Arc<dyn SubmissionFeedback>) -> Self {
        self.feedback = feedback;
        self
    }

    pub fn gateway(&self) -> &Arc<UploadGateway<S>> {
        &self.gateway
    }

    pub fn audit(&self) -> &Arc<AuditTrail> {
        &self.audit
    }

    /// Run one submission through a fresh workflow.
    pub async fn submit(
        &self,
        requester: Option<RequesterId>,
        draft: SubmissionDraft,
    ) -> Result<SubmissionReceipt, BenefitServiceError> {
        let context = SubmissionContext::new(requester, self.feedback.clone());
        let mut workflow =
            SubmissionWorkflow::new(self.repository.clone(), self.gateway.clone(), context);
        if let Some(key) = draft.idempotency_key {
            workflow = workflow.with_idempotency_key(key);
        }
        *workflow.form_mut() = draft.form;
        *workflow.dependents_mut() = DependentListEditor::from_drafts(draft.dependents);
        workflow.invoices_mut().replace_all(draft.invoices);

        let receipt = workflow.submit().await?;
        if receipt.replayed {
            return Ok(receipt);
        }

        let request = &receipt.request;
        self.audit.record(
            &request.id,
            request.requester.0.clone(),
            AuditAction::RequestSubmitted,
            Some(format!("{} of {}", request.kind.label(), request.amount)),
        );
        if !receipt.invoices.is_empty() {
            self.audit.record(
                &request.id,
                request.requester.0.clone(),
                AuditAction::InvoicesAttached,
                Some(format!("{} invoice(s)", receipt.invoices.len())),
            );
        }

        let mut details = BTreeMap::new();
        details.insert("requester".to_string(), request.requester.0.clone());
        details.insert("kind".to_string(), request.kind.label().to_string());
        details.insert("amount".to_string(), request.amount.to_string());
        details.insert("polo".to_string(), request.polo.0.clone());
        self.notify(EmailNotification {
            template: "request_submitted".to_string(),
            request_id: request.id.clone(),
            recipient: NotificationRecipient::ReviewQueue,
            details,
        })
        .await;

        Ok(receipt)
    }

    /// Fetch a request on behalf of its owner; other requesters see nothing.
    pub async fn get(
        &self,
        requester: &RequesterId,
        request_id: &RequestId,
    ) -> Result<BenefitRequest, BenefitServiceError> {
        let record = self
            .repository
            .fetch(request_id)
            .await?
            .filter(|record| &record.requester == requester)
            .ok_or(RepositoryError::NotFound)?;
        Ok(record)
    }

    pub async fn list_for_requester(
        &self,
        requester: &RequesterId,
    ) -> Result<Vec<BenefitRequest>, BenefitServiceError> {
        Ok(self.repository.list_for_requester(requester).await?)
    }

    pub async fn pending_reviews(
        &self,
        limit: usize,
    ) -> Result<Vec<BenefitRequest>, BenefitServiceError> {
        Ok(self.repository.pending(limit).await?)
    }

    /// Approve or reject a pending request and tell the requester.
    pub async fn review(
        &self,
        reviewer: &ReviewerId,
        request_id: &RequestId,
        decision: ReviewDecision,
    ) -> Result<BenefitRequest, BenefitServiceError> {
        let note = decision
            .note
            .map(|note| note.trim().to_string())
            .filter(|note| !note.is_empty());
        if decision.outcome == ReviewOutcome::Reject && note.is_none() {
            return Err(ReviewError::MissingRejectionNote.into());
        }

        let record = self
            .repository
            .fetch(request_id)
            .await?
            .ok_or(RepositoryError::NotFound)?;
        if record.status != RequestStatus::Pending {
            return Err(ReviewError::NotPending {
                id: record.id,
                status: record.status,
            }
            .into());
        }

        let target = decision.outcome.target_status();
        let review = ReviewNote {
            reviewer: reviewer.clone(),
            decided_at: Utc::now(),
            note: note.clone(),
        };
        let updated = self
            .repository
            .update_status(request_id, target, Some(review))
            .await?;

        let (action, template) = match decision.outcome {
            ReviewOutcome::Approve => (AuditAction::RequestApproved, "request_approved"),
            ReviewOutcome::Reject => (AuditAction::RequestRejected, "request_rejected"),
        };
        self.audit
            .record(&updated.id, reviewer.0.clone(), action, note.clone());
        info!(
            request_id = %updated.id,
            reviewer = %reviewer,
            status = updated.status.label(),
            "benefit request reviewed"
        );

        let mut details = BTreeMap::new();
        details.insert("status".to_string(), updated.status.label().to_string());
        details.insert("amount".to_string(), updated.amount.to_string());
        if let Some(note) = note {
            details.insert("note".to_string(), note);
        }
        self.notify(EmailNotification {
            template: template.to_string(),
            request_id: updated.id.clone(),
            recipient: NotificationRecipient::Requester(updated.requester.clone()),
            details,
        })
        .await;

        Ok(updated)
    }

    /// Audit entries for an existing request, oldest first.
    pub async fn audit_history(
        &self,
        request_id: &RequestId,
    ) -> Result<Vec<AuditEntry>, BenefitServiceError> {
        self.repository
            .fetch(request_id)
            .await?
            .ok_or(RepositoryError::NotFound)?;
        Ok(self.audit.for_request(request_id))
    }

    async fn notify(&self, notification: EmailNotification) {
        let template = notification.template.clone();
        let request_id = notification.request_id.clone();
        if let Err(err) = self.notifications.publish(notification).await {
            warn!(
                request_id = %request_id,
                template = %template,
                error = %err,
                "notification could not be delivered"
            );
        }
    }
}

/// Error raised by the benefit request service.
#[derive(Debug, thiserror::Error)]
pub enum BenefitServiceError {
    #[error(transparent)]
    Submission(#[from] SubmissionError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Review(#[from] ReviewError),
}
