//! Application configuration module
//!
//! Configuration is layered: an optional file named by `GATEKEEPER_CONFIG_FILE`
//! (YAML, TOML or JSON, picked by extension), then environment variables with
//! the `GATEKEEPER` prefix, where nested values use `__` as separator.
//!
//! # Example
//!
//! ```no_run
//! use gatekeeper::config::AppConfig;
//!
//! let config = AppConfig::load().expect("Failed to load configuration");
//! config.validate().expect("Invalid configuration");
//!
//! println!("Server running on {}", config.server.socket_addr().unwrap());
//! ```

mod admission;
mod error;
mod redis;
mod server;

pub use admission::AdmissionConfig;
pub use error::{ConfigError, ValidationError};
pub use redis::RedisConfig;
pub use server::{Environment, ServerConfig};

use serde::Deserialize;
use std::path::Path;

/// Environment variable naming an optional configuration file.
pub const CONFIG_FILE_VAR: &str = "GATEKEEPER_CONFIG_FILE";

/// Root application configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// Server configuration (host, port, environment)
    #[serde(default)]
    pub server: ServerConfig,

    /// Redis configuration (distributed counter)
    #[serde(default)]
    pub redis: RedisConfig,

    /// Admission rules and supervisor settings
    #[serde(default)]
    pub admission: AdmissionConfig,
}

impl AppConfig {
    /// Load configuration from the optional file and environment variables
    ///
    /// This function:
    /// 1. Loads `.env` file if present (for development)
    /// 2. Reads the file named by `GATEKEEPER_CONFIG_FILE`, if set
    /// 3. Reads environment variables with `GATEKEEPER` prefix
    /// 4. Deserializes into typed configuration structs
    ///
    /// # Environment Variable Format
    ///
    /// - `GATEKEEPER__SERVER__PORT=8080` -> `server.port = 8080`
    /// - `GATEKEEPER__REDIS__URL=...` -> `redis.url = ...`
    /// - `GATEKEEPER__ADMISSION__EXEMPT_PATHS=/health,/ready` -> list
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file cannot be read or values cannot be
    /// parsed into expected types.
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if present (development)
        dotenvy::dotenv().ok();

        let file = std::env::var(CONFIG_FILE_VAR).ok();
        Self::load_from(file.as_deref().map(Path::new))
    }

    /// Load configuration from an explicit file (if any) plus environment.
    pub fn load_from(file: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let config = builder
            .add_source(
                config::Environment::default()
                    .prefix("GATEKEEPER")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("admission.exempt_paths"),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Validate all configuration values
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` for the first invalid section, including
    /// any rule that fails to build.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.server.validate()?;
        self.redis.validate()?;
        self.admission.validate()?;
        Ok(())
    }

    /// Check if running in production environment
    pub fn is_production(&self) -> bool {
        self.server.is_production()
    }
}
