//! Admission control domain.
//!
//! Pure types and algorithms: scopes, validated limit rules, the rule
//! registry, decisions, and the two counting algorithms (sliding-window
//! log and token bucket). Nothing in here performs I/O.

mod backend_mode;
mod decision;
mod registry;
mod rule;
mod scope;
mod sliding_window;
mod token_bucket;

pub use backend_mode::BackendMode;
pub use decision::{CounterKey, CounterOutcome, Decision, ScopeStatus};
pub use registry::RuleRegistry;
pub use rule::{LimitRule, RuleConfig, RuleError};
pub use scope::{Scope, ScopeKind};
pub use sliding_window::SlidingLog;
pub use token_bucket::TokenBucket;
