//! Counter backend port for admission control.
//!
//! A backend owns the per-key counting state. Implementations:
//!
//! - `RedisCounter` - shared sorted sets, consistent across instances
//! - `LocalCounter` - in-process map, per-instance only
//! - `DegradationSupervisor` - routes to one of the two above
//!
//! Backend failures are returned as [`BackendError`] values, never
//! panics, so callers branch on them instead of unwinding.

use async_trait::async_trait;
use std::time::Duration;

use crate::domain::admission::{CounterKey, CounterOutcome, LimitRule};
use crate::domain::foundation::Timestamp;

/// Port for sliding-window counting.
///
/// Implementations must be safe to share across tasks and must make
/// `evaluate_and_record` atomic per key.
#[async_trait]
pub trait CounterBackend: Send + Sync {
    /// Checks the key against the rule and records the attempt if admitted.
    ///
    /// A rejected attempt is never recorded.
    async fn evaluate_and_record(
        &self,
        key: &CounterKey,
        rule: &LimitRule,
        now: Timestamp,
    ) -> Result<CounterOutcome, BackendError>;

    /// Reports the key's current usage without consuming quota.
    async fn peek(
        &self,
        key: &CounterKey,
        rule: &LimitRule,
        now: Timestamp,
    ) -> Result<CounterOutcome, BackendError>;

    /// Cheap liveness check used by the health probe.
    async fn health_check(&self) -> Result<(), BackendError>;

    /// Short backend name for logs.
    fn name(&self) -> &'static str;
}

/// Errors that can occur while talking to a counter backend.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BackendError {
    /// Backend could not be reached (refused, dropped, I/O failure).
    #[error("counter backend unavailable: {0}")]
    Unavailable(String),

    /// Backend did not answer within the request-path budget.
    #[error("counter backend timed out after {0:?}")]
    Timeout(Duration),

    /// Backend answered, but not in a way we understand.
    #[error("counter backend internal error: {0}")]
    Internal(String),
}

impl BackendError {
    /// True for failures that should trigger the local fallback.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, BackendError::Unavailable(_) | BackendError::Timeout(_))
    }
}
