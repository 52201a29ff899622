//! API Middleware
//!
//! Operation context and request logging middleware.

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, HeaderValue, Request, StatusCode},
    middleware::Next,
    response::Response,
};
use tokio::time::Instant;
use uuid::Uuid;

use crate::domain::OperationContext;

use super::routes::AppState;

/// Header carrying the caller's correlation id
pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";

// =========================================================================
// Operation context
// =========================================================================

/// Read or generate the correlation id
fn correlation_id_from(headers: &HeaderMap) -> Uuid {
    headers
        .get(CORRELATION_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| Uuid::parse_str(v.trim()).ok())
        .unwrap_or_else(Uuid::new_v4)
}

/// Attach an `OperationContext` with correlation id and request deadline
pub async fn context_middleware(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let correlation_id = correlation_id_from(request.headers());

    let context = OperationContext::new()
        .with_correlation_id(correlation_id)
        .with_timeout(state.request_timeout);
    request.extensions_mut().insert(context);

    let mut response = next.run(request).await;

    if let Ok(value) = HeaderValue::from_str(&correlation_id.to_string()) {
        response.headers_mut().insert(CORRELATION_ID_HEADER, value);
    }

    response
}

// =========================================================================
// Request logging
// =========================================================================

/// How a ledger request ended, as far as the caller is concerned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    Completed,
    /// Refused for the caller's reasons: bad amount, unknown account, no funds
    Rejected,
    /// The ledger could not give a definite answer, or broke
    Failed,
}

impl RequestOutcome {
    pub fn from_status(status: StatusCode) -> Self {
        if status.is_server_error() {
            Self::Failed
        } else if status.is_client_error() {
            Self::Rejected
        } else {
            Self::Completed
        }
    }
}

/// Log every ledger request once, when it completes.
///
/// Only the path is logged; legacy `/get?id=` queries stay out of the logs.
pub async fn logging_middleware(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_owned();

    let correlation_id = request
        .extensions()
        .get::<OperationContext>()
        .and_then(|ctx| ctx.correlation_id);

    let start = Instant::now();
    let response = next.run(request).await;
    let duration_ms = start.elapsed().as_millis();
    let status = response.status();

    match RequestOutcome::from_status(status) {
        RequestOutcome::Completed => tracing::info!(
            method = %method,
            path = %path,
            status = status.as_u16(),
            duration_ms = %duration_ms,
            correlation_id = ?correlation_id,
            "Ledger request completed"
        ),
        RequestOutcome::Rejected => tracing::info!(
            method = %method,
            path = %path,
            status = status.as_u16(),
            duration_ms = %duration_ms,
            correlation_id = ?correlation_id,
            "Ledger request rejected"
        ),
        RequestOutcome::Failed => tracing::warn!(
            method = %method,
            path = %path,
            status = status.as_u16(),
            duration_ms = %duration_ms,
            correlation_id = ?correlation_id,
            "Ledger request failed"
        ),
    }

    response
}
