//! Limit rules: one quota for one scope kind.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::ScopeKind;

/// Configuration errors raised while building rules.
///
/// Any of these aborts startup; rules never change after load.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleError {
    #[error("{scope} rule must allow at least one request")]
    ZeroMaxRequests { scope: ScopeKind },

    #[error("{scope} rule must have a window of at least one second")]
    ZeroWindow { scope: ScopeKind },

    #[error("{scope} rule has a burst allowance of zero")]
    ZeroBurst { scope: ScopeKind },

    #[error("path override '{path}' is only valid on per_endpoint rules, found on {scope}")]
    MisplacedPathOverride { scope: ScopeKind, path: String },

    #[error("path override '{0}' must be an absolute path")]
    InvalidPath(String),

    #[error("duplicate {scope} rule{}", .path.as_deref().map(|p| format!(" for '{}'", p)).unwrap_or_default())]
    Duplicate {
        scope: ScopeKind,
        path: Option<String>,
    },
}

/// Raw rule as it appears in configuration files and environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleConfig {
    pub scope: ScopeKind,
    pub max_requests: u32,
    pub window_seconds: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub burst_allowance: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path_override: Option<String>,
}

impl RuleConfig {
    /// Validates the entry and converts it into a [`LimitRule`].
    pub fn into_rule(self) -> Result<LimitRule, RuleError> {
        let mut rule = LimitRule::new(self.scope, self.max_requests, self.window_seconds)?;
        if let Some(burst) = self.burst_allowance {
            rule = rule.with_burst(burst)?;
        }
        if let Some(path) = self.path_override {
            rule = rule.for_path(path)?;
        }
        Ok(rule)
    }
}

/// A validated, immutable quota.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LimitRule {
    scope: ScopeKind,
    max_requests: u32,
    window_seconds: u32,
    burst_allowance: Option<u32>,
    path_override: Option<String>,
}

impl LimitRule {
    /// Creates a rule, rejecting zero quotas and zero windows.
    pub fn new(scope: ScopeKind, max_requests: u32, window_seconds: u32) -> Result<Self, RuleError> {
        if max_requests == 0 {
            return Err(RuleError::ZeroMaxRequests { scope });
        }
        if window_seconds == 0 {
            return Err(RuleError::ZeroWindow { scope });
        }
        Ok(Self {
            scope,
            max_requests,
            window_seconds,
            burst_allowance: None,
            path_override: None,
        })
    }

    /// Adds a burst allowance enforced by a token bucket in process-local counting.
    pub fn with_burst(mut self, burst: u32) -> Result<Self, RuleError> {
        if burst == 0 {
            return Err(RuleError::ZeroBurst { scope: self.scope });
        }
        self.burst_allowance = Some(burst);
        Ok(self)
    }

    /// Restricts a per-endpoint rule to one exact path.
    pub fn for_path(mut self, path: impl Into<String>) -> Result<Self, RuleError> {
        let path = path.into();
        if self.scope != ScopeKind::PerEndpoint {
            return Err(RuleError::MisplacedPathOverride {
                scope: self.scope,
                path,
            });
        }
        if !path.starts_with('/') {
            return Err(RuleError::InvalidPath(path));
        }
        self.path_override = Some(path);
        Ok(self)
    }

    pub fn scope(&self) -> ScopeKind {
        self.scope
    }

    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    pub fn window_seconds(&self) -> u32 {
        self.window_seconds
    }

    pub fn window_millis(&self) -> i64 {
        i64::from(self.window_seconds) * 1000
    }

    pub fn burst_allowance(&self) -> Option<u32> {
        self.burst_allowance
    }

    pub fn path_override(&self) -> Option<&str> {
        self.path_override.as_deref()
    }

    /// Token refill rate (tokens per second) that matches the sustained quota.
    pub fn refill_rate(&self) -> f64 {
        f64::from(self.max_requests) / f64::from(self.window_seconds)
    }

    /// Short quota fingerprint embedded in counter keys, e.g. `100r60s`
    /// or `100r60s10b` with a burst allowance.
    ///
    /// Changing a quota yields fresh keys instead of reinterpreting old state.
    pub fn fingerprint(&self) -> String {
        match self.burst_allowance {
            Some(burst) => format!("{}r{}s{}b", self.max_requests, self.window_seconds, burst),
            None => format!("{}r{}s", self.max_requests, self.window_seconds),
        }
    }
}
