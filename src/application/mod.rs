//! Application layer - use cases that orchestrate domain and ports.
//!
//! - `admission` - decides whether an inbound request may proceed

pub mod admission;

pub use admission::{AdmissionController, AdmissionRequest};
