//! Renders admission decisions as HTTP headers and 429 bodies.
//!
//! Headers:
//! - `X-RateLimit-Limit`: quota of the reported scope
//! - `X-RateLimit-Remaining`: requests left in the current window
//! - `X-RateLimit-Reset`: Unix timestamp (seconds) when the window frees up
//! - `Retry-After`: whole seconds to wait (only on rejection)

use std::time::Duration;

use http::{header::RETRY_AFTER, HeaderMap, HeaderName, HeaderValue};
use serde::Serialize;

use crate::domain::admission::Decision;

/// Error code carried by every 429 body.
pub const RATE_LIMIT_EXCEEDED: &str = "RATE_LIMIT_EXCEEDED";

/// Standard rate limit header names.
pub mod headers {
    use super::HeaderName;

    /// Maximum requests allowed in the window.
    pub static X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
    /// Requests remaining in the current window.
    pub static X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
    /// Unix timestamp when the window resets.
    pub static X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");
}

/// JSON body of a 429 response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RateLimitErrorBody {
    pub status: &'static str,
    pub error_code: &'static str,
    pub message: String,
    pub limit: u32,
    pub remaining: u32,
    pub reset_at: u64,
    pub retry_after: u64,
    pub scope: Option<String>,
}

/// Everything the middleware attaches to a response for one decision.
#[derive(Debug, Clone, Default)]
pub struct RateLimitMetadata {
    pub headers: HeaderMap,
    pub body: Option<RateLimitErrorBody>,
}

/// Builds headers (and, on rejection, the error body) for a decision.
///
/// `X-RateLimit-*` headers are only emitted for metered decisions; every
/// rejection gets `Retry-After` and a body.
pub fn decorate(decision: &Decision) -> RateLimitMetadata {
    let reset_at = decision.reset_at.as_unix_secs();
    let mut headers = HeaderMap::new();
    if decision.is_metered() {
        headers.insert(headers::X_RATELIMIT_LIMIT.clone(), HeaderValue::from(decision.limit));
        headers.insert(
            headers::X_RATELIMIT_REMAINING.clone(),
            HeaderValue::from(decision.remaining),
        );
        headers.insert(headers::X_RATELIMIT_RESET.clone(), HeaderValue::from(reset_at));
    }

    if decision.allowed {
        return RateLimitMetadata {
            headers,
            body: None,
        };
    }

    let retry_after = retry_after_secs(decision.retry_after.unwrap_or(Duration::ZERO));
    headers.insert(RETRY_AFTER, HeaderValue::from(retry_after));

    let scope = decision.violated_scope.as_ref().map(|s| s.kind().to_string());
    let message = match &scope {
        Some(scope) => format!(
            "Rate limit exceeded for {} scope. Retry after {} seconds.",
            scope, retry_after
        ),
        None => format!("Rate limit exceeded. Retry after {} seconds.", retry_after),
    };

    RateLimitMetadata {
        headers,
        body: Some(RateLimitErrorBody {
            status: "error",
            error_code: RATE_LIMIT_EXCEEDED,
            message,
            limit: decision.limit,
            remaining: decision.remaining,
            reset_at,
            retry_after,
            scope,
        }),
    }
}

/// Whole seconds, rounded up, never below one.
fn retry_after_secs(wait: Duration) -> u64 {
    let secs = wait.as_secs() + u64::from(wait.subsec_nanos() > 0);
    secs.max(1)
}
