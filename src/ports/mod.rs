//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the domain and the outside world. Adapters implement these ports.
//!
//! - `CounterBackend` - sliding-window counting store (Redis, in-memory)

mod counter_backend;

pub use counter_backend::{BackendError, CounterBackend};
