//! Axum router configuration for the admission status endpoints.

use axum::{routing::get, Router};

use crate::adapters::http::middleware::AdmissionAppState;

use super::handlers::{get_backend_status, get_rate_limit_status};

/// Create the admission status router.
///
/// # Routes
/// - `GET /status` - Caller's quota usage per scope (evaluate-only)
/// - `GET /backend` - Supervisor mode and admission metrics
///
/// Mount it at `/api/v1/rate-limit` outside the admission middleware so
/// that checking a quota never spends it.
pub fn admission_routes() -> Router<AdmissionAppState> {
    Router::new()
        .route("/status", get(get_rate_limit_status))
        .route("/backend", get(get_backend_status))
}

/// Create the complete admission module router, mounted under `/api/v1/rate-limit`.
pub fn admission_router() -> Router<AdmissionAppState> {
    Router::new().nest("/api/v1/rate-limit", admission_routes())
}
