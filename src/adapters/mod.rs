//! Adapters - Implementations of port interfaces.
//!
//! Adapters connect the domain to external systems:
//! - `counter` - Counter backends (Redis, in-memory, degradation supervisor)
//! - `http` - Axum middleware and status endpoints

pub mod counter;
pub mod http;

pub use counter::{DegradationSupervisor, LocalCounter, RedisCounter, SupervisorConfig};
