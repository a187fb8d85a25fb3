//! HTTP handlers for the admission status endpoints.
//!
//! Neither handler consumes quota: they are mounted outside the admission
//! middleware and only read counter state.

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Request, State};
use axum::response::IntoResponse;
use axum::Json;

use crate::adapters::http::middleware::AdmissionAppState;
use crate::domain::admission::BackendMode;

use super::dto::{BackendStatusResponse, RateLimitStatusResponse};

/// GET /api/v1/rate-limit/status - Caller's quota usage per scope
pub async fn get_rate_limit_status(
    State(state): State<AdmissionAppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    request: Request,
) -> impl IntoResponse {
    let admission = state.admission_request(&request, connect_info.as_ref());
    let statuses = state.controller.status(&admission).await;

    Json(RateLimitStatusResponse::new(
        admission.client_ip,
        admission.user_id.map(|id| id.to_string()),
        &statuses,
    ))
}

/// GET /api/v1/rate-limit/backend - Active counting backend and metrics
pub async fn get_backend_status(State(state): State<AdmissionAppState>) -> impl IntoResponse {
    let supervisor = state.supervisor.as_ref().map(|s| s.metrics());
    let mode = supervisor
        .as_ref()
        .map(|m| m.mode)
        .unwrap_or(BackendMode::Degraded);

    Json(BackendStatusResponse {
        mode,
        admission: state.controller.metrics(),
        supervisor,
    })
}
