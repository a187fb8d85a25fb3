//! Admission control middleware for axum.
//!
//! Every request is checked by the [`AdmissionController`] before it
//! reaches a handler. Admitted requests get `X-RateLimit-*` headers merged
//! into the handler's response; rejected ones are answered with 429 and
//! never reach the handler.
//!
//! The client is identified by its socket peer address. `X-Forwarded-For`
//! and `X-Real-IP` are only read when the service sits behind a proxy that
//! overwrites them, see [`AdmissionAppState::trusting_forwarded_headers`].
//!
//! # Example
//!
//! ```ignore
//! use axum::{Router, routing::get, middleware};
//!
//! let state = AdmissionAppState::new(controller);
//!
//! let app = Router::new()
//!     .route("/api/v1/knowledge/search", get(search))
//!     .layer(middleware::from_fn_with_state(state, admission_middleware));
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderName, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};

use crate::adapters::counter::DegradationSupervisor;
use crate::application::admission::{AdmissionController, AdmissionRequest};
use crate::domain::admission::Decision;
use crate::domain::foundation::{AuthenticatedUser, Timestamp, UserId};

use super::decorator::decorate;

/// Shared state for the admission middleware and the status endpoints.
#[derive(Clone)]
pub struct AdmissionAppState {
    pub controller: Arc<AdmissionController>,
    /// Present when a distributed backend is configured.
    pub supervisor: Option<Arc<DegradationSupervisor>>,
    /// Header set by a trusted upstream gateway that carries the user id.
    ///
    /// Only consulted when no `AuthenticatedUser` extension is present.
    pub user_header: Option<HeaderName>,
    /// Read the client address from `X-Forwarded-For` / `X-Real-IP`.
    ///
    /// Off by default: those headers are caller-controlled unless a proxy
    /// in front of the service rewrites them.
    pub trust_forwarded_headers: bool,
}

impl AdmissionAppState {
    pub fn new(controller: Arc<AdmissionController>) -> Self {
        Self {
            controller,
            supervisor: None,
            user_header: None,
            trust_forwarded_headers: false,
        }
    }

    pub fn with_supervisor(mut self, supervisor: Arc<DegradationSupervisor>) -> Self {
        self.supervisor = Some(supervisor);
        self
    }

    pub fn with_user_header(mut self, header: HeaderName) -> Self {
        self.user_header = Some(header);
        self
    }

    pub fn trusting_forwarded_headers(mut self) -> Self {
        self.trust_forwarded_headers = true;
        self
    }

    /// Builds the controller's view of an incoming request.
    pub fn admission_request<B>(
        &self,
        request: &axum::http::Request<B>,
        connect_info: Option<&ConnectInfo<SocketAddr>>,
    ) -> AdmissionRequest {
        let admission = AdmissionRequest::new(
            extract_client_ip(request, connect_info, self.trust_forwarded_headers),
            request.uri().path(),
            Timestamp::now(),
        );
        match self.user_id(request) {
            Some(user_id) => admission.with_user(user_id),
            None => admission,
        }
    }

    fn user_id<B>(&self, request: &axum::http::Request<B>) -> Option<UserId> {
        if let Some(user) = request.extensions().get::<AuthenticatedUser>() {
            return Some(user.id.clone());
        }
        let header = self.user_header.as_ref()?;
        request
            .headers()
            .get(header)
            .and_then(|h| h.to_str().ok())
            .and_then(|raw| UserId::new(raw.trim()).ok())
    }
}

/// Admission middleware: check, then forward or reject with 429.
pub async fn admission_middleware(
    State(state): State<AdmissionAppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    request: Request,
    next: Next,
) -> Response {
    let admission = state.admission_request(&request, connect_info.as_ref());
    let decision = state.controller.admit(&admission).await;

    if let Some(response) = rejection(&decision) {
        return response;
    }

    let mut response = next.run(request).await;
    response.headers_mut().extend(decorate(&decision).headers);
    response
}

/// The 429 response for a rejected decision; `None` when it was allowed.
pub(crate) fn rejection(decision: &Decision) -> Option<Response> {
    if decision.allowed {
        return None;
    }
    let metadata = decorate(decision);
    let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(metadata.body)).into_response();
    response.headers_mut().extend(metadata.headers);
    Some(response)
}

/// Extract client IP from request.
///
/// With `trust_forwarded` set, the order of precedence is:
/// 1. X-Forwarded-For header (first IP in list)
/// 2. X-Real-IP header
/// 3. ConnectInfo socket address
///
/// Otherwise only the socket address is used.
pub(crate) fn extract_client_ip<B>(
    request: &axum::http::Request<B>,
    connect_info: Option<&ConnectInfo<SocketAddr>>,
    trust_forwarded: bool,
) -> Option<String> {
    let peer = connect_info.map(|ci| ci.0.ip().to_string());
    if !trust_forwarded {
        return peer;
    }

    let forwarded = request
        .headers()
        .get("X-Forwarded-For")
        .and_then(|h| h.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty());
    if let Some(ip) = forwarded {
        return Some(ip.to_string());
    }

    let real_ip = request
        .headers()
        .get("X-Real-IP")
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|ip| !ip.is_empty());
    if let Some(ip) = real_ip {
        return Some(ip.to_string());
    }

    peer
}
