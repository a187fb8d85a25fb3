//! HTTP middleware for axum.
//!
//! - `admission` - admission control layer and its shared state
//! - `decorator` - renders decisions as `X-RateLimit-*` headers and 429 bodies

pub mod admission;
pub mod decorator;

pub use admission::{admission_middleware, AdmissionAppState};
pub use decorator::{decorate, headers, RateLimitErrorBody, RateLimitMetadata, RATE_LIMIT_EXCEEDED};
