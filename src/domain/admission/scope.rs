//! Scopes along which quotas are tracked.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::foundation::UserId;

/// The kind of scope a rule applies to, as written in configuration.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeKind {
    /// One shared quota for every request.
    Global,
    /// Quota per client IP address.
    PerClient,
    /// Quota per request path.
    PerEndpoint,
    /// Quota per authenticated user.
    PerUser,
}

impl ScopeKind {
    /// Fixed evaluation order used by the admission controller.
    pub const EVALUATION_ORDER: [ScopeKind; 4] = [
        ScopeKind::Global,
        ScopeKind::PerClient,
        ScopeKind::PerEndpoint,
        ScopeKind::PerUser,
    ];

    /// Returns the configuration name of the scope kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            ScopeKind::Global => "global",
            ScopeKind::PerClient => "per_client",
            ScopeKind::PerEndpoint => "per_endpoint",
            ScopeKind::PerUser => "per_user",
        }
    }

    /// Short tag used inside counter keys.
    pub fn key_tag(&self) -> &'static str {
        match self {
            ScopeKind::Global => "global",
            ScopeKind::PerClient => "client",
            ScopeKind::PerEndpoint => "endpoint",
            ScopeKind::PerUser => "user",
        }
    }
}

impl fmt::Display for ScopeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A concrete scope instance for one request.
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub enum Scope {
    Global,
    PerClient(String),
    PerEndpoint(String),
    PerUser(UserId),
}

impl Scope {
    /// Returns the kind of this scope.
    pub fn kind(&self) -> ScopeKind {
        match self {
            Scope::Global => ScopeKind::Global,
            Scope::PerClient(_) => ScopeKind::PerClient,
            Scope::PerEndpoint(_) => ScopeKind::PerEndpoint,
            Scope::PerUser(_) => ScopeKind::PerUser,
        }
    }

    /// Returns the identifier within the scope, if the scope has one.
    pub fn identifier(&self) -> Option<&str> {
        match self {
            Scope::Global => None,
            Scope::PerClient(ip) => Some(ip),
            Scope::PerEndpoint(path) => Some(path),
            Scope::PerUser(user_id) => Some(user_id.as_str()),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.identifier() {
            Some(identifier) => write!(f, "{}({})", self.kind(), identifier),
            None => write!(f, "{}", self.kind()),
        }
    }
}
