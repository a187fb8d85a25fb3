//! Redis configuration

use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;

/// Redis configuration for the distributed counter.
///
/// Without a URL the service counts per instance only.
#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    /// Redis connection URL (may embed credentials)
    #[serde(default)]
    pub url: Option<Secret<String>>,

    /// Per-command timeout in milliseconds
    #[serde(default = "default_command_timeout")]
    pub command_timeout_ms: u64,
}

impl RedisConfig {
    /// Whether a distributed backend is configured.
    pub fn is_enabled(&self) -> bool {
        self.url.is_some()
    }

    /// Get command timeout as Duration
    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    /// Validate Redis configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(url) = &self.url {
            let url = url.expose_secret();
            if !url.starts_with("redis://") && !url.starts_with("rediss://") {
                return Err(ValidationError::InvalidRedisUrl);
            }
        }
        if !(1..=1000).contains(&self.command_timeout_ms) {
            return Err(ValidationError::InvalidCommandTimeout);
        }
        Ok(())
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: None,
            command_timeout_ms: default_command_timeout(),
        }
    }
}

fn default_command_timeout() -> u64 {
    50
}
