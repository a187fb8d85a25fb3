//! Admission control configuration

use axum::http::HeaderName;
use serde::Deserialize;
use std::time::Duration;

use crate::domain::admission::{RuleConfig, RuleRegistry, ScopeKind};

use super::error::ValidationError;

/// Admission rules and supervisor settings.
#[derive(Debug, Clone, Deserialize)]
pub struct AdmissionConfig {
    /// Quota rules; replaces the default set entirely when given
    #[serde(default = "default_rules")]
    pub rules: Vec<RuleConfig>,

    /// Prefix for every counter key
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// Interval between health probes of the distributed backend
    #[serde(default = "default_probe_interval")]
    pub probe_interval_ms: u64,

    /// Paths that are never metered
    #[serde(default = "default_exempt_paths")]
    pub exempt_paths: Vec<String>,

    /// Header carrying the user id from a trusted upstream gateway
    #[serde(default)]
    pub user_header: Option<String>,

    /// Take the client address from `X-Forwarded-For` / `X-Real-IP`
    ///
    /// Only safe behind a proxy that overwrites those headers.
    #[serde(default)]
    pub trust_forwarded_headers: bool,
}

impl AdmissionConfig {
    /// Build the rule registry from the configured rules.
    pub fn registry(&self) -> Result<RuleRegistry, ValidationError> {
        Ok(RuleRegistry::from_config(&self.rules)?)
    }

    /// Get probe interval as Duration
    pub fn probe_interval(&self) -> Duration {
        Duration::from_millis(self.probe_interval_ms)
    }

    /// Parsed user header, if configured.
    pub fn user_header(&self) -> Result<Option<HeaderName>, ValidationError> {
        self.user_header
            .as_deref()
            .map(|name| {
                HeaderName::from_bytes(name.trim().as_bytes())
                    .map_err(|_| ValidationError::InvalidUserHeader(name.to_string()))
            })
            .transpose()
    }

    /// Validate admission configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.key_prefix.is_empty() || self.key_prefix.contains(':') {
            return Err(ValidationError::InvalidKeyPrefix);
        }
        if !(100..=60_000).contains(&self.probe_interval_ms) {
            return Err(ValidationError::InvalidProbeInterval);
        }
        if let Some(path) = self.exempt_paths.iter().find(|p| !p.starts_with('/')) {
            return Err(ValidationError::InvalidExemptPath(path.clone()));
        }
        self.user_header()?;
        self.registry()?;
        Ok(())
    }
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            rules: default_rules(),
            key_prefix: default_key_prefix(),
            probe_interval_ms: default_probe_interval(),
            exempt_paths: default_exempt_paths(),
            user_header: None,
            trust_forwarded_headers: false,
        }
    }
}

fn rule(scope: ScopeKind, max_requests: u32, window_seconds: u32) -> RuleConfig {
    RuleConfig {
        scope,
        max_requests,
        window_seconds,
        burst_allowance: None,
        path_override: None,
    }
}

fn endpoint(path: &str, max_requests: u32, window_seconds: u32) -> RuleConfig {
    RuleConfig {
        path_override: Some(path.to_string()),
        ..rule(ScopeKind::PerEndpoint, max_requests, window_seconds)
    }
}

fn default_rules() -> Vec<RuleConfig> {
    vec![
        rule(ScopeKind::Global, 1000, 60),
        rule(ScopeKind::PerClient, 100, 60),
        rule(ScopeKind::PerUser, 200, 60),
        endpoint("/api/v1/knowledge/search", 30, 60),
        endpoint("/api/v1/auth/login", 5, 300),
        endpoint("/api/v1/auth/register", 3, 3600),
    ]
}

fn default_key_prefix() -> String {
    "ratelimit".to_string()
}

fn default_probe_interval() -> u64 {
    5_000
}

fn default_exempt_paths() -> Vec<String> {
    vec!["/health".to_string()]
}
