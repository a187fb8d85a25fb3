//! Which counter backend currently answers admission checks.

use serde::Serialize;
use std::fmt;

use crate::domain::foundation::StateMachine;

/// Two-state mode of the degradation supervisor.
///
/// ```text
/// Distributed --[backend error / failed probe]--> Degraded
/// Degraded    --[successful probe]-------------> Distributed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendMode {
    /// Shared store; limits hold across every instance.
    #[default]
    Distributed,
    /// Process-local fallback; limits hold per instance only.
    Degraded,
}

impl BackendMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendMode::Distributed => "distributed",
            BackendMode::Degraded => "degraded",
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, BackendMode::Degraded)
    }
}

impl StateMachine for BackendMode {
    fn can_transition_to(&self, target: &Self) -> bool {
        use BackendMode::*;
        matches!((self, target), (Distributed, Degraded) | (Degraded, Distributed))
    }
}

impl fmt::Display for BackendMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
