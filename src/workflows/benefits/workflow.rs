//! Client-side request submission: validate, create the record, then attach invoices.
//!
//! The workflow owns the editable form state (fields, dependent rows and queued
//! invoices) and walks `Idle → Validating → CreatingRequest → UploadingInvoices → Done`,
//! dropping into `Errored` when identity is missing or a remote call fails. Creation
//! happens before any upload, so an upload failure leaves a request without its
//! invoices; that partial success is reported to the user as a failure.
//!
//! Retries reuse the idempotency key issued for the same validated contents, so a
//! creation whose response was lost does not produce a second record. Invoices
//! stored by a failed attempt are reused by the retry instead of uploaded again.

use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{debug, error, info, warn};

use super::calculator::suggest_reimbursement;
use super::dependents::DependentListEditor;
use super::domain::{
    BenefitRequest, IdempotencyKey, InvoiceMetadata, InvoiceReference, NewBenefitRequest,
    RequestId, RequestStatus, RequesterId,
};
use super::invoices::InvoiceAttachmentCollector;
use super::linking::{InvoiceLinker, LinkError};
use super::repository::{RepositoryError, RequestRepository};
use super::storage::{ObjectStorage, UploadGateway};
use super::validation::{validate_submission, SubmissionForm, ValidatedSubmission, ValidationErrors};

pub const SUBMITTED_MESSAGE: &str = "Request submitted successfully.";
pub const GENERIC_FAILURE_MESSAGE: &str =
    "We could not submit your request. Please try again in a few minutes.";
pub const SESSION_EXPIRED_MESSAGE: &str =
    "Your session has expired. Sign in again to submit the request.";
pub const INVALID_FORM_MESSAGE: &str = "Some fields need attention before submitting.";

/// User-facing notification channel (toasts in the web client).
pub trait SubmissionFeedback: Send + Sync {
    fn success(&self, message: &str);
    fn failure(&self, message: &str);
}

/// Feedback sink that only logs, used where no user interface is attached.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingFeedback;

impl SubmissionFeedback for TracingFeedback {
    fn success(&self, message: &str) {
        info!(message, "submission feedback");
    }

    fn failure(&self, message: &str) {
        warn!(message, "submission feedback");
    }
}

/// Identity and notification access handed to the workflow explicitly.
#[derive(Clone)]
pub struct SubmissionContext {
    pub requester: Option<RequesterId>,
    pub feedback: Arc<dyn SubmissionFeedback>,
}

impl SubmissionContext {
    pub fn new(requester: Option<RequesterId>, feedback: Arc<dyn SubmissionFeedback>) -> Self {
        Self {
            requester,
            feedback,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionState {
    Idle,
    Validating,
    CreatingRequest,
    UploadingInvoices,
    Done,
    Errored(SubmissionFailure),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionFailure {
    MissingIdentity,
    Creation,
    Upload,
}

/// Successful submission: the stored request and the invoices linked to it.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmissionReceipt {
    pub request: BenefitRequest,
    pub invoices: Vec<InvoiceReference>,
    /// The idempotency key matched a request that had already been queued.
    pub replayed: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum SubmissionError {
    #[error(transparent)]
    Validation(#[from] ValidationErrors),
    #[error("no authenticated requester for this submission")]
    IdentityMissing,
    #[error("request creation failed: {0}")]
    Creation(#[source] RepositoryError),
    #[error("request {request_id} was created but its invoices were not attached: {source}")]
    Upload {
        request_id: RequestId,
        #[source]
        source: LinkError,
    },
    #[error("request {request_id} could not be queued for review: {source}")]
    Finalize {
        request_id: RequestId,
        #[source]
        source: RepositoryError,
    },
}

impl SubmissionError {
    /// Message shown to the requester; remote causes collapse into one generic text.
    pub fn user_message(&self) -> &'static str {
        match self {
            SubmissionError::Validation(_) => INVALID_FORM_MESSAGE,
            SubmissionError::IdentityMissing => SESSION_EXPIRED_MESSAGE,
            SubmissionError::Creation(_)
            | SubmissionError::Upload { .. }
            | SubmissionError::Finalize { .. } => GENERIC_FAILURE_MESSAGE,
        }
    }

    /// Request left behind by a failed submission, if creation got that far.
    pub fn orphaned_request(&self) -> Option<&RequestId> {
        match self {
            SubmissionError::Upload { request_id, .. }
            | SubmissionError::Finalize { request_id, .. } => Some(request_id),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct AttemptSnapshot {
    submission: ValidatedSubmission,
    invoices: Vec<InvoiceMetadata>,
}

pub struct SubmissionWorkflow<R, S> {
    repository: Arc<R>,
    linker: InvoiceLinker<R, S>,
    context: SubmissionContext,
    form: SubmissionForm,
    dependents: DependentListEditor,
    invoices: InvoiceAttachmentCollector,
    state: SubmissionState,
    transitions: Vec<SubmissionState>,
    supplied_key: Option<IdempotencyKey>,
    attempt: Option<(IdempotencyKey, AttemptSnapshot)>,
    /// Invoices uploaded under the current attempt's request.
    stored: Vec<InvoiceReference>,
}

impl<R, S> SubmissionWorkflow<R, S>
where
    R: RequestRepository + 'static,
    S: ObjectStorage + 'static,
{
    pub fn new(
        repository: Arc<R>,
        gateway: Arc<UploadGateway<S>>,
        context: SubmissionContext,
    ) -> Self {
        let linker = InvoiceLinker::new(repository.clone(), gateway);
        Self {
            repository,
            linker,
            context,
            form: SubmissionForm::default(),
            dependents: DependentListEditor::new(),
            invoices: InvoiceAttachmentCollector::new(),
            state: SubmissionState::Idle,
            transitions: vec![SubmissionState::Idle],
            supplied_key: None,
            attempt: None,
            stored: Vec::new(),
        }
    }

    /// Use a caller supplied idempotency key for the next creation attempt.
    pub fn with_idempotency_key(mut self, key: IdempotencyKey) -> Self {
        self.supplied_key = Some(key);
        self
    }

    pub fn state(&self) -> SubmissionState {
        self.state
    }

    /// Every state entered so far, starting with `Idle`.
    pub fn transitions(&self) -> &[SubmissionState] {
        &self.transitions
    }

    pub fn form(&self) -> &SubmissionForm {
        &self.form
    }

    pub fn form_mut(&mut self) -> &mut SubmissionForm {
        &mut self.form
    }

    pub fn dependents(&self) -> &DependentListEditor {
        &self.dependents
    }

    pub fn dependents_mut(&mut self) -> &mut DependentListEditor {
        &mut self.dependents
    }

    pub fn invoices(&self) -> &InvoiceAttachmentCollector {
        &self.invoices
    }

    pub fn invoices_mut(&mut self) -> &mut InvoiceAttachmentCollector {
        &mut self.invoices
    }

    /// Key that the current or last attempt sent to the repository.
    pub fn idempotency_key(&self) -> Option<&IdempotencyKey> {
        self.attempt.as_ref().map(|(key, _)| key)
    }

    /// Advisory amount for the salary currently in the form.
    pub fn suggested_amount(&self) -> Decimal {
        suggest_reimbursement(self.form.salary.unwrap_or(Decimal::ZERO).max(Decimal::ZERO))
    }

    pub async fn submit(&mut self) -> Result<SubmissionReceipt, SubmissionError> {
        self.transition(SubmissionState::Validating);

        let validated = match validate_submission(&self.form, self.dependents.entries()) {
            Ok(validated) => validated,
            Err(errors) => {
                debug!(
                    invalid_fields = errors.errors.len(),
                    "submission rejected by validation"
                );
                self.transition(SubmissionState::Idle);
                return Err(SubmissionError::Validation(errors));
            }
        };

        let Some(requester) = self.context.requester.clone() else {
            return Err(self.fail(
                SubmissionFailure::MissingIdentity,
                SubmissionError::IdentityMissing,
            ));
        };

        let invoice_metadata = self.invoices.metadata();
        let idempotency_key = self.idempotency_key_for(AttemptSnapshot {
            submission: validated.clone(),
            invoices: invoice_metadata.clone(),
        });

        self.transition(SubmissionState::CreatingRequest);
        let request = NewBenefitRequest {
            kind: validated.kind,
            amount: validated.amount,
            polo: validated.polo,
            cpf: validated.cpf,
            dependents: validated.dependents,
            invoices: invoice_metadata,
            idempotency_key,
        };
        let created = match self.repository.create(&requester, request).await {
            Ok(created) => created,
            Err(source) => {
                return Err(self.fail(
                    SubmissionFailure::Creation,
                    SubmissionError::Creation(source),
                ))
            }
        };
        debug!(request_id = %created.id, "request record created");

        if created.status != RequestStatus::Created {
            info!(
                request_id = %created.id,
                status = created.status.label(),
                "idempotency key matched a finished submission"
            );
            return Ok(self.finish(created, Vec::new(), true));
        }

        let queued = self.invoices.with_files();
        let invoices = if queued.is_empty() {
            Vec::new()
        } else {
            self.transition(SubmissionState::UploadingInvoices);
            match self
                .linker
                .link(&created.id, &queued, &mut self.stored)
                .await
            {
                Ok(invoices) => invoices,
                Err(source) => {
                    return Err(self.fail(
                        SubmissionFailure::Upload,
                        SubmissionError::Upload {
                            request_id: created.id.clone(),
                            source,
                        },
                    ))
                }
            }
        };

        let request = match self
            .repository
            .update_status(&created.id, RequestStatus::Pending, None)
            .await
        {
            Ok(request) => request,
            Err(source) => {
                return Err(self.fail(
                    SubmissionFailure::Creation,
                    SubmissionError::Finalize {
                        request_id: created.id.clone(),
                        source,
                    },
                ))
            }
        };

        info!(
            request_id = %request.id,
            requester = %requester,
            invoices = invoices.len(),
            "benefit request submitted"
        );
        Ok(self.finish(request, invoices, false))
    }

    fn finish(
        &mut self,
        request: BenefitRequest,
        invoices: Vec<InvoiceReference>,
        replayed: bool,
    ) -> SubmissionReceipt {
        self.transition(SubmissionState::Done);
        self.reset_local_state();
        self.context.feedback.success(SUBMITTED_MESSAGE);
        SubmissionReceipt {
            request,
            invoices,
            replayed,
        }
    }

    fn idempotency_key_for(&mut self, snapshot: AttemptSnapshot) -> IdempotencyKey {
        if let Some((key, previous)) = &self.attempt {
            if *previous == snapshot {
                return key.clone();
            }
        }

        let key = self
            .supplied_key
            .take()
            .unwrap_or_else(IdempotencyKey::generate);
        self.attempt = Some((key.clone(), snapshot));
        self.stored.clear();
        key
    }

    fn fail(&mut self, stage: SubmissionFailure, error: SubmissionError) -> SubmissionError {
        error!(?stage, error = %error, "benefit request submission failed");
        self.transition(SubmissionState::Errored(stage));
        self.context.feedback.failure(error.user_message());
        error
    }

    fn transition(&mut self, next: SubmissionState) {
        debug!(from = ?self.state, to = ?next, "submission state changed");
        self.state = next;
        self.transitions.push(next);
    }

    fn reset_local_state(&mut self) {
        self.form.clear();
        self.dependents.clear();
        self.invoices.clear();
        self.attempt = None;
        self.stored.clear();
        self.supplied_key = None;
    }
}
