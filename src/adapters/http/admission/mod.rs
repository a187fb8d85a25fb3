//! HTTP adapter for admission control endpoints.
//!
//! Exposes quota state via REST API:
//! - `GET /api/v1/rate-limit/status` - Caller's per-scope quota usage
//! - `GET /api/v1/rate-limit/backend` - Counting backend mode and metrics

pub mod dto;
pub mod handlers;
pub mod routes;

pub use dto::*;
pub use routes::{admission_router, admission_routes};
