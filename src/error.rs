//! Error handling module
//!
//! Centralized error types and HTTP response conversion.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::domain::LedgerError;

/// Seconds a client is asked to wait before resubmitting after a 503
const RETRY_AFTER_SECS: &str = "1";

/// Application error types
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    // Client errors (4xx)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    // Ledger errors
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::InvalidRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::InvalidRequest(rejection.body_text())
    }
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl AppError {
    fn parts(&self) -> (StatusCode, &'static str, Option<String>) {
        match self {
            // 400 Bad Request
            AppError::InvalidRequest(msg) => {
                (StatusCode::BAD_REQUEST, "invalid_request", Some(msg.clone()))
            }

            AppError::Ledger(ledger_err) => match ledger_err {
                LedgerError::InvalidAmount(reason) => {
                    (StatusCode::BAD_REQUEST, "invalid_amount", Some(reason.to_string()))
                }
                LedgerError::SameAccount => {
                    (StatusCode::BAD_REQUEST, "same_account_transfer", None)
                }
                LedgerError::AccountNotFound(id) => {
                    (StatusCode::NOT_FOUND, "account_not_found", Some(id.to_string()))
                }
                LedgerError::InsufficientFunds { .. } => {
                    (StatusCode::CONFLICT, "insufficient_funds", None)
                }
                LedgerError::BalanceOverflow(id) => {
                    (StatusCode::UNPROCESSABLE_ENTITY, "balance_overflow", Some(id.to_string()))
                }
                LedgerError::Unavailable(msg) => {
                    tracing::warn!("Ledger unavailable: {}", msg);
                    (StatusCode::SERVICE_UNAVAILABLE, "ledger_unavailable", None)
                }
                LedgerError::Unknown(msg) => {
                    tracing::error!("Ledger outcome unknown: {}", msg);
                    (StatusCode::GATEWAY_TIMEOUT, "outcome_unknown", None)
                }

                // 500 Internal Server Error
                LedgerError::Backend(msg) => {
                    tracing::error!("Ledger backend failure: {}", msg);
                    (StatusCode::INTERNAL_SERVER_ERROR, "ledger_error", None)
                }
            },
        }
    }

    /// HTTP status this error is reported with
    pub fn status_code(&self) -> StatusCode {
        self.parts().0
    }

    /// Whether resubmitting the same request later may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::Ledger(err) if err.is_transient())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_code, details) = self.parts();

        let body = ErrorResponse {
            error: self.to_string(),
            error_code: error_code.to_string(),
            details,
        };

        let mut response = (status, Json(body)).into_response();
        if self.is_retryable() {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from_static(RETRY_AFTER_SECS));
        }
        response
    }
}
