use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::http::StatusCode;
use axum::response::Response;
use rust_decimal::Decimal;
use serde_json::Value;

use crate::workflows::benefits::audit::AuditTrail;
use crate::workflows::benefits::domain::{
    BenefitRequest, IdempotencyKey, InvoiceReference, NewBenefitRequest, RequestId, RequestKind,
    RequestStatus, RequesterId, ReviewNote,
};
use crate::workflows::benefits::invoices::{InvoiceFile, PendingInvoice};
use crate::workflows::benefits::repository::{
    EmailNotification, NotificationError, NotificationPublisher, RepositoryError,
    RequestRepository,
};
use crate::workflows::benefits::service::{BenefitRequestService, SubmissionDraft};
use crate::workflows::benefits::storage::{
    InMemoryObjectStorage, ObjectStorage, StorageError, StoragePath, UploadClock, UploadGateway,
};
use crate::workflows::benefits::validation::SubmissionForm;
use crate::workflows::benefits::workflow::{
    SubmissionContext, SubmissionFeedback, SubmissionWorkflow,
};

pub(super) const MIB: usize = 1024 * 1024;
pub(super) const UPLOAD_LIMIT: u64 = 50 * 1024 * 1024;
pub(super) const FROZEN_MILLIS: i64 = 1_760_000_000_000;

pub(super) fn requester() -> RequesterId {
    RequesterId("emp-0042".to_string())
}

pub(super) fn valid_form() -> SubmissionForm {
    SubmissionForm {
        kind: RequestKind::MedicalReimbursement,
        amount: Some(Decimal::new(50_000, 2)),
        polo: "3M Sumaré".to_string(),
        cpf: "12345678901".to_string(),
        salary: Some(Decimal::new(1_500, 0)),
    }
}

pub(super) fn invoice(name: &str, size: usize) -> PendingInvoice {
    PendingInvoice::with_file(
        InvoiceFile::new(name, "application/pdf", vec![b'%'; size]),
        Some(format!("receipt {name}")),
    )
}

pub(super) fn draft_with_invoices(invoices: Vec<PendingInvoice>) -> SubmissionDraft {
    SubmissionDraft {
        form: valid_form(),
        dependents: Vec::new(),
        invoices,
        idempotency_key: None,
    }
}

/// Clock stuck at one instant so storage keys are predictable.
pub(super) struct FrozenClock(pub(super) i64);

impl UploadClock for FrozenClock {
    fn now_millis(&self) -> i64 {
        self.0
    }
}

pub(super) fn gateway_with_limit<S: ObjectStorage + 'static>(
    storage: Arc<S>,
    limit: u64,
) -> Arc<UploadGateway<S>> {
    Arc::new(UploadGateway::with_clock(
        storage,
        limit,
        Arc::new(FrozenClock(FROZEN_MILLIS)),
    ))
}

/// In-memory storage that can be told to refuse writes once it holds some objects.
pub(super) struct FlakyStorage {
    objects: InMemoryObjectStorage,
    capacity: AtomicUsize,
}

impl Default for FlakyStorage {
    fn default() -> Self {
        Self {
            objects: InMemoryObjectStorage::new(),
            capacity: AtomicUsize::new(usize::MAX),
        }
    }
}

impl FlakyStorage {
    pub(super) fn refuse_writes_after(&self, stored: usize) {
        self.capacity.store(stored, Ordering::SeqCst);
    }

    pub(super) fn recover(&self) {
        self.capacity.store(usize::MAX, Ordering::SeqCst);
    }
}

impl std::ops::Deref for FlakyStorage {
    type Target = InMemoryObjectStorage;

    fn deref(&self) -> &Self::Target {
        &self.objects
    }
}

#[async_trait]
impl ObjectStorage for FlakyStorage {
    async fn put_object(&self, key: &StoragePath, file: &InvoiceFile) -> Result<(), StorageError> {
        if self.objects.len() >= self.capacity.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("bucket unreachable".to_string()));
        }
        self.objects.put_object(key, file).await
    }

    async fn contains(&self, key: &StoragePath) -> Result<bool, StorageError> {
        self.objects.contains(key).await
    }
}

#[derive(Default)]
struct RepositoryState {
    records: BTreeMap<RequestId, BenefitRequest>,
    keys: HashMap<(RequesterId, IdempotencyKey), RequestId>,
    sequence: u64,
}

/// In-memory repository with switches for the failure modes the workflow handles.
#[derive(Default, Clone)]
pub(super) struct MemoryRepository {
    state: Arc<Mutex<RepositoryState>>,
    create_calls: Arc<AtomicUsize>,
    fail_creates: Arc<AtomicBool>,
    lose_create_response: Arc<AtomicBool>,
    fail_status_updates: Arc<AtomicBool>,
}

impl MemoryRepository {
    pub(super) fn fail_creates(&self, enabled: bool) {
        self.fail_creates.store(enabled, Ordering::SeqCst);
    }

    /// Store the record but report a transport failure, as a dropped response would.
    pub(super) fn lose_create_response(&self, enabled: bool) {
        self.lose_create_response.store(enabled, Ordering::SeqCst);
    }

    pub(super) fn fail_status_updates(&self, enabled: bool) {
        self.fail_status_updates.store(enabled, Ordering::SeqCst);
    }

    pub(super) fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub(super) fn records(&self) -> Vec<BenefitRequest> {
        self.state
            .lock()
            .expect("repository mutex poisoned")
            .records
            .values()
            .cloned()
            .collect()
    }
}

#[async_trait]
impl RequestRepository for MemoryRepository {
    async fn create(
        &self,
        requester: &RequesterId,
        request: NewBenefitRequest,
    ) -> Result<BenefitRequest, RepositoryError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_creates.load(Ordering::SeqCst) {
            return Err(RepositoryError::Unavailable("database offline".to_string()));
        }

        let mut state = self.state.lock().expect("repository mutex poisoned");
        let dedupe_key = (requester.clone(), request.idempotency_key.clone());
        if let Some(existing) = state.keys.get(&dedupe_key) {
            let record = state.records.get(existing).cloned();
            return record.ok_or(RepositoryError::NotFound);
        }

        state.sequence += 1;
        let id = RequestId(format!("req-{:06}", state.sequence));
        let record = BenefitRequest::from_new(
            id.clone(),
            requester.clone(),
            request,
            chrono::Utc::now(),
        );
        state.keys.insert(dedupe_key, id.clone());
        state.records.insert(id, record.clone());

        if self.lose_create_response.load(Ordering::SeqCst) {
            return Err(RepositoryError::Unavailable(
                "connection reset before response".to_string(),
            ));
        }
        Ok(record)
    }

    async fn attach_invoices(
        &self,
        id: &RequestId,
        invoices: Vec<InvoiceReference>,
    ) -> Result<(), RepositoryError> {
        let mut state = self.state.lock().expect("repository mutex poisoned");
        let record = state.records.get_mut(id).ok_or(RepositoryError::NotFound)?;
        record.attach_invoices(invoices);
        Ok(())
    }

    async fn update_status(
        &self,
        id: &RequestId,
        status: RequestStatus,
        review: Option<ReviewNote>,
    ) -> Result<BenefitRequest, RepositoryError> {
        if self.fail_status_updates.load(Ordering::SeqCst) {
            return Err(RepositoryError::Unavailable("database offline".to_string()));
        }

        let mut state = self.state.lock().expect("repository mutex poisoned");
        let record = state.records.get_mut(id).ok_or(RepositoryError::NotFound)?;
        if !record.status.can_transition_to(status) {
            return Err(RepositoryError::InvalidTransition {
                from: record.status,
                to: status,
            });
        }
        record.status = status;
        if review.is_some() {
            record.review = review;
        }
        Ok(record.clone())
    }

    async fn fetch(&self, id: &RequestId) -> Result<Option<BenefitRequest>, RepositoryError> {
        let state = self.state.lock().expect("repository mutex poisoned");
        Ok(state.records.get(id).cloned())
    }

    async fn list_for_requester(
        &self,
        requester: &RequesterId,
    ) -> Result<Vec<BenefitRequest>, RepositoryError> {
        let state = self.state.lock().expect("repository mutex poisoned");
        Ok(state
            .records
            .values()
            .filter(|record| &record.requester == requester)
            .cloned()
            .collect())
    }

    async fn pending(&self, limit: usize) -> Result<Vec<BenefitRequest>, RepositoryError> {
        let state = self.state.lock().expect("repository mutex poisoned");
        Ok(state
            .records
            .values()
            .filter(|record| record.status == RequestStatus::Pending)
            .take(limit)
            .cloned()
            .collect())
    }
}

#[derive(Default, Clone)]
pub(super) struct MemoryNotifications {
    events: Arc<Mutex<Vec<EmailNotification>>>,
    offline: Arc<AtomicBool>,
}

impl MemoryNotifications {
    pub(super) fn events(&self) -> Vec<EmailNotification> {
        self.events
            .lock()
            .expect("notification mutex poisoned")
            .clone()
    }

    pub(super) fn go_offline(&self) {
        self.offline.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl NotificationPublisher for MemoryNotifications {
    async fn publish(&self, notification: EmailNotification) -> Result<(), NotificationError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(NotificationError::Transport("smtp relay down".to_string()));
        }
        self.events
            .lock()
            .expect("notification mutex poisoned")
            .push(notification);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) enum Toast {
    Success(String),
    Failure(String),
}

#[derive(Default)]
pub(super) struct RecordingFeedback {
    toasts: Mutex<Vec<Toast>>,
}

impl RecordingFeedback {
    pub(super) fn toasts(&self) -> Vec<Toast> {
        self.toasts.lock().expect("feedback mutex poisoned").clone()
    }
}

impl SubmissionFeedback for RecordingFeedback {
    fn success(&self, message: &str) {
        self.toasts
            .lock()
            .expect("feedback mutex poisoned")
            .push(Toast::Success(message.to_string()));
    }

    fn failure(&self, message: &str) {
        self.toasts
            .lock()
            .expect("feedback mutex poisoned")
            .push(Toast::Failure(message.to_string()));
    }
}

pub(super) struct WorkflowHarness {
    pub(super) workflow: SubmissionWorkflow<MemoryRepository, FlakyStorage>,
    pub(super) repository: Arc<MemoryRepository>,
    pub(super) storage: Arc<FlakyStorage>,
    pub(super) feedback: Arc<RecordingFeedback>,
}

pub(super) fn workflow_for(requester: Option<RequesterId>) -> WorkflowHarness {
    let repository = Arc::new(MemoryRepository::default());
    let storage = Arc::new(FlakyStorage::default());
    let feedback = Arc::new(RecordingFeedback::default());
    let context = SubmissionContext::new(requester, feedback.clone());
    let workflow = SubmissionWorkflow::new(
        repository.clone(),
        gateway_with_limit(storage.clone(), UPLOAD_LIMIT),
        context,
    );
    WorkflowHarness {
        workflow,
        repository,
        storage,
        feedback,
    }
}

pub(super) type TestService =
    BenefitRequestService<MemoryRepository, InMemoryObjectStorage, MemoryNotifications>;

pub(super) struct ServiceHarness {
    pub(super) service: Arc<TestService>,
    pub(super) repository: Arc<MemoryRepository>,
    pub(super) storage: Arc<InMemoryObjectStorage>,
    pub(super) notifications: Arc<MemoryNotifications>,
    pub(super) audit: Arc<AuditTrail>,
}

pub(super) fn build_service() -> ServiceHarness {
    build_service_with_limit(UPLOAD_LIMIT)
}

pub(super) fn build_service_with_limit(limit: u64) -> ServiceHarness {
    let repository = Arc::new(MemoryRepository::default());
    let storage = Arc::new(InMemoryObjectStorage::new());
    let notifications = Arc::new(MemoryNotifications::default());
    let audit = Arc::new(AuditTrail::new());
    let service = BenefitRequestService::new(
        repository.clone(),
        gateway_with_limit(storage.clone(), limit),
        notifications.clone(),
        audit.clone(),
    );
    ServiceHarness {
        service: Arc::new(service),
        repository,
        storage,
        notifications,
        audit,
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}

pub(super) fn assert_status(response: &Response, expected: StatusCode) {
    assert_eq!(response.status(), expected, "unexpected status code");
}
