use crate::config::ConfigError;
use crate::telemetry::TelemetryError;
use crate::workflows::benefits::workflow::INVALID_FORM_MESSAGE;
use crate::workflows::benefits::{
    BenefitServiceError, RepositoryError, ReviewError, SubmissionError, ValidationErrors,
};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::fmt;

#[derive(Debug)]
pub enum AppError {
    Config(ConfigError),
    Telemetry(TelemetryError),
    Io(std::io::Error),
    Server(axum::Error),
    Service(BenefitServiceError),
    /// A route needing an identity header was called without it.
    MissingIdentity(&'static str),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(err) => write!(f, "configuration error: {}", err),
            AppError::Telemetry(err) => write!(f, "telemetry error: {}", err),
            AppError::Io(err) => write!(f, "io error: {}", err),
            AppError::Server(err) => write!(f, "server error: {}", err),
            AppError::Service(err) => write!(f, "benefit request error: {}", err),
            AppError::MissingIdentity(header) => write!(f, "missing {} header", header),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Config(err) => Some(err),
            AppError::Telemetry(err) => Some(err),
            AppError::Io(err) => Some(err),
            AppError::Server(err) => Some(err),
            AppError::Service(err) => Some(err),
            AppError::MissingIdentity(_) => None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            AppError::Service(BenefitServiceError::Submission(SubmissionError::Validation(
                errors,
            ))) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                json!({ "error": INVALID_FORM_MESSAGE, "fields": errors.errors }),
            ),
            AppError::Service(BenefitServiceError::Submission(
                err @ SubmissionError::IdentityMissing,
            )) => (
                StatusCode::UNAUTHORIZED,
                json!({ "error": err.user_message() }),
            ),
            // Remote causes stay in the logs; the caller gets the generic text
            // and the id of any request left without its invoices.
            AppError::Service(BenefitServiceError::Submission(err)) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({
                    "error": err.user_message(),
                    "request_id": err.orphaned_request().map(|id| id.0.clone()),
                }),
            ),
            AppError::Service(BenefitServiceError::Repository(RepositoryError::NotFound)) => (
                StatusCode::NOT_FOUND,
                json!({ "error": "request not found" }),
            ),
            AppError::Service(
                err @ BenefitServiceError::Review(ReviewError::MissingRejectionNote),
            ) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                json!({ "error": err.to_string() }),
            ),
            AppError::Service(
                err @ (BenefitServiceError::Review(ReviewError::NotPending { .. })
                | BenefitServiceError::Repository(RepositoryError::InvalidTransition {
                    ..
                })),
            ) => (StatusCode::CONFLICT, json!({ "error": err.to_string() })),
            err @ AppError::MissingIdentity(_) => {
                (StatusCode::UNAUTHORIZED, json!({ "error": err.to_string() }))
            }
            other => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "error": other.to_string() }),
            ),
        };

        (status, Json(body)).into_response()
    }
}

impl From<ConfigError> for AppError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<TelemetryError> for AppError {
    fn from(value: TelemetryError) -> Self {
        Self::Telemetry(value)
    }
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<axum::Error> for AppError {
    fn from(value: axum::Error) -> Self {
        Self::Server(value)
    }
}

impl From<BenefitServiceError> for AppError {
    fn from(value: BenefitServiceError) -> Self {
        Self::Service(value)
    }
}

impl From<SubmissionError> for AppError {
    fn from(value: SubmissionError) -> Self {
        Self::Service(BenefitServiceError::Submission(value))
    }
}

impl From<ValidationErrors> for AppError {
    fn from(value: ValidationErrors) -> Self {
        Self::from(SubmissionError::Validation(value))
    }
}
