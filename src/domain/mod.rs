//! Domain layer containing admission rules and shared primitives.
//!
//! # Module Organization
//!
//! - `foundation` - Shared domain primitives (timestamps, IDs, errors, auth)
//! - `admission` - Scopes, limit rules, decisions and counting algorithms

pub mod admission;
pub mod foundation;
