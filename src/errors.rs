use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use sea_orm::error::DbErr;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::quote::{QuoteEvent, QuoteStatus};

/// Error body returned by every failing endpoint
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// HTTP status category (e.g., "Not Found", "Conflict")
    pub error: String,
    /// Machine-readable error code (e.g., "illegal_transition")
    pub code: String,
    /// Human-readable error description
    pub message: String,
    /// RFC 3339 timestamp when the error was produced
    pub timestamp: String,
}

/// Errors surfaced by the quote engine.
///
/// Guard failures (`IllegalTransition`, `InvalidState`, `NotConvertible`, `EmptyQuote`,
/// `DivisionByZero`, `NotFound`) are raised before any mutation and leave state untouched.
/// `DownstreamFailure` is raised after compensation has run.
#[derive(thiserror::Error, Debug)]
pub enum ServiceError {
    #[error("Illegal transition: cannot apply '{event}' to a quote in status '{from}'")]
    IllegalTransition { from: QuoteStatus, event: QuoteEvent },

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Quote {0} is not convertible: {1}")]
    NotConvertible(Uuid, String),

    #[error("Quote {0} has no line items")]
    EmptyQuote(Uuid),

    #[error("Division by zero: {0}")]
    DivisionByZero(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Downstream failure: {0}")]
    DownstreamFailure(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Concurrent modification: {0}")]
    ConcurrentModification(Uuid),

    #[error("Deadline exceeded before {0}")]
    DeadlineExceeded(String),

    #[error("Database error: {0}")]
    DatabaseError(#[from] DbErr),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl ServiceError {
    pub fn not_found(kind: &str, id: impl std::fmt::Display) -> Self {
        ServiceError::NotFound(format!("{} {} not found", kind, id))
    }

    /// Stable machine code, also used as the metrics label for rejected operations.
    pub fn code(&self) -> &'static str {
        match self {
            Self::IllegalTransition { .. } => "illegal_transition",
            Self::InvalidState(_) => "invalid_state",
            Self::NotConvertible(..) => "not_convertible",
            Self::EmptyQuote(_) => "empty_quote",
            Self::DivisionByZero(_) => "division_by_zero",
            Self::NotFound(_) => "not_found",
            Self::DownstreamFailure(_) => "downstream_failure",
            Self::ValidationError(_) => "validation_error",
            Self::ConcurrentModification(_) => "concurrent_modification",
            Self::DeadlineExceeded(_) => "deadline_exceeded",
            Self::DatabaseError(_) => "database_error",
            Self::InternalError(_) => "internal_error",
        }
    }

    /// Returns the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::ValidationError(_) => StatusCode::BAD_REQUEST,
            Self::IllegalTransition { .. }
            | Self::NotConvertible(..)
            | Self::ConcurrentModification(_) => StatusCode::CONFLICT,
            Self::InvalidState(_) | Self::EmptyQuote(_) | Self::DivisionByZero(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            Self::DownstreamFailure(_) => StatusCode::BAD_GATEWAY,
            Self::DeadlineExceeded(_) => StatusCode::GATEWAY_TIMEOUT,
            Self::DatabaseError(_) | Self::InternalError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Returns the error message suitable for HTTP responses.
    /// Internal errors return generic messages to avoid leaking implementation details.
    pub fn response_message(&self) -> String {
        match self {
            Self::DatabaseError(_) => "Database error".to_string(),
            Self::InternalError(_) => "Internal server error".to_string(),
            _ => self.to_string(),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(code = self.code(), "request failed: {}", self);
        }

        let err = ErrorResponse {
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            code: self.code().to_string(),
            message: self.response_message(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        (status, Json(err)).into_response()
    }
}
