use async_trait::async_trait;
use benefit_requests::error::AppError;
use benefit_requests::workflows::benefits::{
    AuditTrail, BenefitRequest, BenefitRequestService, DependentDraft, EmailNotification,
    IdempotencyKey, InMemoryObjectStorage, InvoiceFile, InvoiceReference, NewBenefitRequest,
    NotificationError, NotificationPublisher, RepositoryError, RequestId, RequestKind,
    RequestRepository, RequestStatus, RequesterId, ReviewNote, UploadGateway,
};
use chrono::Utc;
use metrics_exporter_prometheus::PrometheusHandle;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::str::FromStr;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::info;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

pub(crate) type InMemoryService = BenefitRequestService<
    InMemoryRequestRepository,
    InMemoryObjectStorage,
    InMemoryNotificationOutbox,
>;

/// Wire the service to process-local backends.
pub(crate) fn in_memory_service(
    max_file_bytes: u64,
) -> (InMemoryService, Arc<InMemoryObjectStorage>) {
    let storage = Arc::new(InMemoryObjectStorage::new());
    let service = BenefitRequestService::new(
        Arc::new(InMemoryRequestRepository::default()),
        Arc::new(UploadGateway::new(storage.clone(), max_file_bytes)),
        Arc::new(InMemoryNotificationOutbox::default()),
        Arc::new(AuditTrail::new()),
    );
    (service, storage)
}

#[derive(Default)]
struct RepositoryState {
    records: BTreeMap<RequestId, BenefitRequest>,
    keys: HashMap<(RequesterId, IdempotencyKey), RequestId>,
    sequence: u64,
}

#[derive(Default, Clone)]
pub(crate) struct InMemoryRequestRepository {
    state: Arc<Mutex<RepositoryState>>,
}

impl InMemoryRequestRepository {
    fn lock(&self) -> Result<MutexGuard<'_, RepositoryState>, RepositoryError> {
        self.state
            .lock()
            .map_err(|_| RepositoryError::Unavailable("repository mutex poisoned".to_string()))
    }
}

#[async_trait]
impl RequestRepository for InMemoryRequestRepository {
    async fn create(
        &self,
        requester: &RequesterId,
        request: NewBenefitRequest,
    ) -> Result<BenefitRequest, RepositoryError> {
        let mut state = self.lock()?;
        let dedupe_key = (requester.clone(), request.idempotency_key.clone());
        if let Some(existing) = state.keys.get(&dedupe_key) {
            return state
                .records
                .get(existing)
                .cloned()
                .ok_or(RepositoryError::NotFound);
        }

        state.sequence += 1;
        let id = RequestId(format!("req-{:06}", state.sequence));
        let record = BenefitRequest::from_new(id.clone(), requester.clone(), request, Utc::now());
        state.keys.insert(dedupe_key, id.clone());
        state.records.insert(id, record.clone());
        Ok(record)
    }

    async fn attach_invoices(
        &self,
        id: &RequestId,
        invoices: Vec<InvoiceReference>,
    ) -> Result<(), RepositoryError> {
        let mut state = self.lock()?;
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
        let mut state = self.lock()?;
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
        Ok(self.lock()?.records.get(id).cloned())
    }

    async fn list_for_requester(
        &self,
        requester: &RequesterId,
    ) -> Result<Vec<BenefitRequest>, RepositoryError> {
        Ok(self
            .lock()?
            .records
            .values()
            .filter(|record| &record.requester == requester)
            .cloned()
            .collect())
    }

    async fn pending(&self, limit: usize) -> Result<Vec<BenefitRequest>, RepositoryError> {
        let state = self.lock()?;
        let mut pending: Vec<_> = state
            .records
            .values()
            .filter(|record| record.status == RequestStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by_key(|record| record.created_at);
        pending.truncate(limit);
        Ok(pending)
    }
}

/// Keeps notifications in memory and logs them in place of the mailer.
#[derive(Default, Clone)]
pub(crate) struct InMemoryNotificationOutbox {
    events: Arc<Mutex<Vec<EmailNotification>>>,
}

#[async_trait]
impl NotificationPublisher for InMemoryNotificationOutbox {
    async fn publish(&self, notification: EmailNotification) -> Result<(), NotificationError> {
        info!(
            template = %notification.template,
            request_id = %notification.request_id,
            recipient = ?notification.recipient,
            "notification queued"
        );
        self.events
            .lock()
            .map_err(|_| NotificationError::Transport("outbox mutex poisoned".to_string()))?
            .push(notification);
        Ok(())
    }
}

pub(crate) fn parse_decimal(raw: &str) -> Result<Decimal, String> {
    Decimal::from_str(&raw.trim().replace(',', "."))
        .map_err(|err| format!("failed to parse '{raw}' as a decimal amount ({err})"))
}

pub(crate) fn parse_kind(raw: &str) -> Result<RequestKind, String> {
    RequestKind::parse(raw).ok_or_else(|| {
        let known: Vec<_> = RequestKind::ordered().iter().map(|kind| kind.tag()).collect();
        format!("unknown request kind '{raw}' (expected one of {})", known.join(", "))
    })
}

/// Parse a `name:relationship` pair; the relationship is validated at submission time.
pub(crate) fn parse_dependent(raw: &str) -> Result<DependentDraft, String> {
    let (name, relationship) = raw
        .rsplit_once(':')
        .ok_or_else(|| format!("expected NAME:RELATIONSHIP, got '{raw}'"))?;
    Ok(DependentDraft {
        name: name.trim().to_string(),
        relationship: relationship.trim().to_string(),
    })
}

/// Read an invoice from disk, guessing its MIME type from the file name.
pub(crate) async fn load_invoice(path: &Path) -> Result<InvoiceFile, AppError> {
    let content = tokio::fs::read(path).await?;
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    let content_type = mime_guess::from_path(path)
        .first_or_octet_stream()
        .essence_str()
        .to_string();
    Ok(InvoiceFile::new(name, content_type, content))
}
