//! API module
//!
//! HTTP API endpoints and middleware.

pub mod middleware;
pub mod routes;

use axum::{middleware as axum_middleware, routing::get, Router};
use tower_http::trace::TraceLayer;

pub use routes::{create_router, legacy_router, AppState};

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    // Layers run last-added first: context -> logging -> handler
    let operations = Router::new()
        .nest("/api/v1", create_router())
        .merge(legacy_router())
        .layer(axum_middleware::from_fn(middleware::logging_middleware))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::context_middleware,
        ));

    Router::new()
        .route("/health", get(health_check))
        .merge(operations)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}
