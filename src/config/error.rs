//! Configuration error types

use thiserror::Error;

use crate::domain::admission::RuleError;

/// Errors that can occur during configuration loading
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration loading failed: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Validation failed: {0}")]
    ValidationFailed(#[from] ValidationError),
}

/// Errors that can occur during configuration validation
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid port number")]
    InvalidPort,

    #[error("Invalid bind address '{0}'")]
    InvalidBindAddress(String),

    #[error("Invalid request timeout")]
    InvalidTimeout,

    #[error("Invalid Redis URL format")]
    InvalidRedisUrl,

    #[error("Redis command timeout must be between 1 and 1000 ms")]
    InvalidCommandTimeout,

    #[error("Probe interval must be between 100 ms and 60 s")]
    InvalidProbeInterval,

    #[error("Counter key prefix must be non-empty and must not contain ':'")]
    InvalidKeyPrefix,

    #[error("Exempt path '{0}' must start with '/'")]
    InvalidExemptPath(String),

    #[error("Invalid user header name '{0}'")]
    InvalidUserHeader(String),

    #[error("Invalid rate limit rule: {0}")]
    InvalidRule(#[from] RuleError),
}
