//! HTTP adapters - REST API implementations.
//!
//! `with_admission` wraps an application router in the admission layer
//! and mounts the status endpoints beside it.

pub mod admission;
pub mod middleware;

use axum::{middleware::from_fn_with_state, Router};

pub use admission::admission_router;
pub use middleware::{admission_middleware, AdmissionAppState};

/// Puts every route of `app` behind admission control.
///
/// The status endpoints are merged after the layer is applied, so they
/// are not metered themselves.
pub fn with_admission(app: Router, state: AdmissionAppState) -> Router {
    app.layer(from_fn_with_state(state.clone(), admission_middleware))
        .merge(admission_router().with_state(state))
}
