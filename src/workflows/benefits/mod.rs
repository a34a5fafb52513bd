//! Benefit reimbursement requests.
//!
//! Requesters fill a form, declare dependents and attach invoices; the submission
//! workflow validates the form, creates the request record and only then uploads
//! the invoices under the new request's storage prefix. Managers approve or reject
//! pending requests through the service, which also keeps the audit trail.

pub mod audit;
pub mod calculator;
pub mod dependents;
pub mod domain;
pub mod invoices;
pub mod linking;
pub mod repository;
pub mod router;
pub mod service;
pub mod storage;
pub mod validation;
pub mod workflow;

#[cfg(test)]
mod tests;

pub use audit::{AuditAction, AuditEntry, AuditTrail};
pub use calculator::{clamp_salary, suggest_reimbursement, REIMBURSEMENT_FLOOR};
pub use dependents::{DependentField, DependentListEditor, EditorError};
pub use domain::{
    BenefitRequest, Cpf, DependentDraft, DependentRecord, IdempotencyKey, InvoiceMetadata,
    InvoiceReference, NewBenefitRequest, Polo, Relationship, RequestId, RequestKind,
    RequestStatus, RequestStatusView, RequesterId, ReviewNote, ReviewerId,
};
pub use invoices::{InvoiceAttachmentCollector, InvoiceFile, PendingInvoice};
pub use linking::{InvoiceLinker, LinkError};
pub use repository::{
    EmailNotification, NotificationError, NotificationPublisher, NotificationRecipient,
    RepositoryError, RequestRepository,
};
pub use router::benefit_router;
pub use service::{
    BenefitRequestService, BenefitServiceError, InvoicePayload, ReviewDecision, ReviewError,
    ReviewOutcome, SubmissionDraft, SubmissionPayload,
};
pub use storage::{
    InMemoryObjectStorage, ObjectStorage, StorageError, StoragePath, UploadError, UploadFailure,
    UploadGateway,
};
pub use validation::{validate_submission, FieldError, FormField, SubmissionForm, ValidationErrors};
pub use workflow::{
    SubmissionContext, SubmissionError, SubmissionFeedback, SubmissionFailure, SubmissionReceipt,
    SubmissionState, SubmissionWorkflow, TracingFeedback,
};
