use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

use super::audit::AuditEntry;
use super::calculator::{clamp_salary, suggest_reimbursement};
use super::domain::{IdempotencyKey, RequestId, RequestStatusView, RequesterId, ReviewerId};
use super::repository::{NotificationPublisher, RequestRepository};
use super::service::{
    BenefitRequestService, ReviewDecision, SubmissionPayload, DEFAULT_PENDING_LIMIT,
};
use super::storage::ObjectStorage;
use super::workflow::SUBMITTED_MESSAGE;
use crate::error::AppError;

pub const REQUESTER_HEADER: &str = "x-requester-id";
pub const REVIEWER_HEADER: &str = "x-reviewer-id";
pub const IDEMPOTENCY_HEADER: &str = "idempotency-key";

/// Invoices one JSON submission body is sized for.
pub const MAX_INVOICES_PER_BODY: u64 = 8;
const BODY_OVERHEAD_BYTES: u64 = 64 * 1024;

type SharedService<R, S, N> = Arc<BenefitRequestService<R, S, N>>;

/// Body ceiling for base64 submissions whose files each stay under `max_file_bytes`.
pub fn submission_body_limit(max_file_bytes: u64) -> usize {
    let encoded = max_file_bytes
        .saturating_mul(MAX_INVOICES_PER_BODY)
        .saturating_mul(4)
        / 3;
    usize::try_from(encoded.saturating_add(BODY_OVERHEAD_BYTES)).unwrap_or(usize::MAX)
}

/// Router builder exposing submission, review and audit endpoints.
pub fn benefit_router<R, S, N>(service: SharedService<R, S, N>) -> Router
where
    R: RequestRepository + 'static,
    S: ObjectStorage + 'static,
    N: NotificationPublisher + 'static,
{
    let body_limit = submission_body_limit(service.gateway().max_file_bytes());
    Router::new()
        .route(
            "/api/v1/benefits/requests",
            post(submit_handler::<R, S, N>).get(list_handler::<R, S, N>),
        )
        .route(
            "/api/v1/benefits/requests/:request_id",
            get(status_handler::<R, S, N>),
        )
        .route(
            "/api/v1/benefits/requests/:request_id/review",
            post(review_handler::<R, S, N>),
        )
        .route(
            "/api/v1/benefits/requests/:request_id/audit",
            get(audit_handler::<R, S, N>),
        )
        .route(
            "/api/v1/benefits/reviews/pending",
            get(pending_handler::<R, S, N>),
        )
        .route(
            "/api/v1/benefits/reimbursement/suggestion",
            post(suggestion_handler),
        )
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(service)
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn requester(headers: &HeaderMap) -> Result<RequesterId, AppError> {
    header_value(headers, REQUESTER_HEADER)
        .map(RequesterId)
        .ok_or(AppError::MissingIdentity(REQUESTER_HEADER))
}

fn reviewer(headers: &HeaderMap) -> Result<ReviewerId, AppError> {
    header_value(headers, REVIEWER_HEADER)
        .map(ReviewerId)
        .ok_or(AppError::MissingIdentity(REVIEWER_HEADER))
}

pub(crate) async fn submit_handler<R, S, N>(
    State(service): State<SharedService<R, S, N>>,
    headers: HeaderMap,
    Json(payload): Json<SubmissionPayload>,
) -> Result<Response, AppError>
where
    R: RequestRepository + 'static,
    S: ObjectStorage + 'static,
    N: NotificationPublisher + 'static,
{
    let idempotency_key = header_value(&headers, IDEMPOTENCY_HEADER).map(IdempotencyKey);
    let draft = payload.into_draft(idempotency_key)?;

    // The workflow reports a missing requester itself, after validation.
    let requester = header_value(&headers, REQUESTER_HEADER).map(RequesterId);
    let receipt = service.submit(requester, draft).await?;
    let status = if receipt.replayed {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    let payload = json!({
        "message": SUBMITTED_MESSAGE,
        "request": receipt.request.status_view(),
        "invoices": receipt.invoices,
    });
    Ok((status, Json(payload)).into_response())
}

pub(crate) async fn list_handler<R, S, N>(
    State(service): State<SharedService<R, S, N>>,
    headers: HeaderMap,
) -> Result<Json<Vec<RequestStatusView>>, AppError>
where
    R: RequestRepository + 'static,
    S: ObjectStorage + 'static,
    N: NotificationPublisher + 'static,
{
    let requester = requester(&headers)?;
    let records = service.list_for_requester(&requester).await?;
    Ok(Json(records.iter().map(|record| record.status_view()).collect()))
}

pub(crate) async fn status_handler<R, S, N>(
    State(service): State<SharedService<R, S, N>>,
    headers: HeaderMap,
    Path(request_id): Path<String>,
) -> Result<Json<RequestStatusView>, AppError>
where
    R: RequestRepository + 'static,
    S: ObjectStorage + 'static,
    N: NotificationPublisher + 'static,
{
    let requester = requester(&headers)?;
    let record = service.get(&requester, &RequestId(request_id)).await?;
    Ok(Json(record.status_view()))
}

#[derive(Debug, Deserialize)]
pub(crate) struct PendingQuery {
    limit: Option<usize>,
}

pub(crate) async fn pending_handler<R, S, N>(
    State(service): State<SharedService<R, S, N>>,
    headers: HeaderMap,
    Query(query): Query<PendingQuery>,
) -> Result<Json<Vec<RequestStatusView>>, AppError>
where
    R: RequestRepository + 'static,
    S: ObjectStorage + 'static,
    N: NotificationPublisher + 'static,
{
    reviewer(&headers)?;
    let limit = query.limit.unwrap_or(DEFAULT_PENDING_LIMIT);
    let records = service.pending_reviews(limit).await?;
    Ok(Json(records.iter().map(|record| record.status_view()).collect()))
}

pub(crate) async fn review_handler<R, S, N>(
    State(service): State<SharedService<R, S, N>>,
    headers: HeaderMap,
    Path(request_id): Path<String>,
    Json(decision): Json<ReviewDecision>,
) -> Result<Json<RequestStatusView>, AppError>
where
    R: RequestRepository + 'static,
    S: ObjectStorage + 'static,
    N: NotificationPublisher + 'static,
{
    let reviewer = reviewer(&headers)?;
    let record = service
        .review(&reviewer, &RequestId(request_id), decision)
        .await?;
    Ok(Json(record.status_view()))
}

pub(crate) async fn audit_handler<R, S, N>(
    State(service): State<SharedService<R, S, N>>,
    headers: HeaderMap,
    Path(request_id): Path<String>,
) -> Result<Json<Vec<AuditEntry>>, AppError>
where
    R: RequestRepository + 'static,
    S: ObjectStorage + 'static,
    N: NotificationPublisher + 'static,
{
    reviewer(&headers)?;
    let entries = service.audit_history(&RequestId(request_id)).await?;
    Ok(Json(entries))
}

/// Salary as typed by the requester; numbers and free text are both accepted.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum SalaryInput {
    Number(serde_json::Number),
    Text(String),
}

#[derive(Debug, Deserialize)]
pub(crate) struct SuggestionRequest {
    salary: SalaryInput,
}

pub(crate) async fn suggestion_handler(
    Json(request): Json<SuggestionRequest>,
) -> Json<serde_json::Value> {
    let salary = match request.salary {
        SalaryInput::Number(number) => clamp_salary(&number.to_string()),
        SalaryInput::Text(text) => clamp_salary(&text),
    };
    Json(json!({
        "salary": salary,
        "suggested_amount": suggest_reimbursement(salary),
    }))
}
