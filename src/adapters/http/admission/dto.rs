//! Data Transfer Objects for the admission status endpoints.

use serde::Serialize;

use crate::adapters::counter::SupervisorMetrics;
use crate::application::admission::AdmissionMetricsSnapshot;
use crate::domain::admission::{BackendMode, ScopeStatus};

// ════════════════════════════════════════════════════════════════════════════════
// Quota Status
// ════════════════════════════════════════════════════════════════════════════════

/// Quota usage for one scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScopeStatusResponse {
    pub scope: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    pub limit: u32,
    pub remaining: u32,
    /// Unix timestamp (seconds) when the oldest counted request leaves the window.
    pub reset_at: u64,
    pub window_seconds: u32,
}

impl From<&ScopeStatus> for ScopeStatusResponse {
    fn from(status: &ScopeStatus) -> Self {
        Self {
            scope: status.scope.kind().to_string(),
            identifier: status.scope.identifier().map(str::to_string),
            limit: status.limit,
            remaining: status.remaining,
            reset_at: status.reset_at.as_unix_secs(),
            window_seconds: status.window_seconds,
        }
    }
}

/// Response for `GET /api/v1/rate-limit/status`.
#[derive(Debug, Clone, Serialize)]
pub struct RateLimitStatusResponse {
    pub client_ip: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub scopes: Vec<ScopeStatusResponse>,
    /// The scope with the least headroom, if any scope applies.
    pub overall: Option<ScopeStatusResponse>,
}

impl RateLimitStatusResponse {
    pub fn new(client_ip: String, user_id: Option<String>, statuses: &[ScopeStatus]) -> Self {
        let overall = statuses
            .iter()
            .min_by(|a, b| {
                a.remaining
                    .cmp(&b.remaining)
                    .then_with(|| b.reset_at.cmp(&a.reset_at))
            })
            .map(ScopeStatusResponse::from);

        Self {
            client_ip,
            user_id,
            scopes: statuses.iter().map(ScopeStatusResponse::from).collect(),
            overall,
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Backend Status
// ════════════════════════════════════════════════════════════════════════════════

/// Response for `GET /api/v1/rate-limit/backend`.
#[derive(Debug, Clone, Serialize)]
pub struct BackendStatusResponse {
    pub mode: BackendMode,
    pub admission: AdmissionMetricsSnapshot,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supervisor: Option<SupervisorMetrics>,
}
