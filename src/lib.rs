//! Gatekeeper - Multi-tier distributed admission control
//!
//! This crate decides, per inbound HTTP request, whether it may proceed
//! under global, per-client, per-endpoint and per-user quotas. Counting is
//! shared across instances through Redis and falls back to a process-local
//! counter while Redis is unreachable.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
