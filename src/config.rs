//! Bridge configuration using Figment
//!
//! Configuration is loaded from:
//! 1. a TOML file (base configuration)
//! 2. environment variables prefixed with `BBFE_`
//!
//! # Environment Variable Overrides
//!
//! Nested keys are separated by a double underscore:
//!
//! ```text
//! BBFE_APPLICATION__LOG_LEVEL=debug
//! BBFE_INSTRUMENT__HOST=bbfe01.example.org
//! BBFE_INSTRUMENT__TIMEOUT_MS=1500
//! ```
//!
//! # Example
//!
//! ```no_run
//! use bbfe_bridge::config::BridgeConfig;
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = BridgeConfig::load_from("config/bbfe.toml")?;
//!     println!("Instrument: {}:{}", config.instrument.host, config.instrument.port);
//!     Ok(())
//! }
//! ```

use crate::link::{LinkSettings, DEFAULT_PORT, DEFAULT_TIMEOUT, RECEIVE_BUFFER_SIZE};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Default configuration file location.
pub const DEFAULT_CONFIG_PATH: &str = "config/bbfe.toml";

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "BBFE_";

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration load error: {0}")]
    LoadError(#[from] figment::Error),
    #[error("Configuration validation error: {0}")]
    ValidationError(String),
}

/// Top-level bridge configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Application settings
    #[serde(default)]
    pub application: ApplicationConfig,
    /// Instrument connection settings
    #[serde(default)]
    pub instrument: InstrumentConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Application name
    #[serde(default = "default_name")]
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Instrument connection configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentConfig {
    /// Host name or address of the front end
    #[serde(default)]
    pub host: String,
    /// Console TCP port
    #[serde(default = "default_port")]
    pub port: u16,
    /// Connect/send/receive timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Bytes accepted by one receive
    #[serde(default = "default_receive_buffer_size")]
    pub receive_buffer_size: usize,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            log_level: default_log_level(),
        }
    }
}

impl Default for InstrumentConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: default_port(),
            timeout_ms: default_timeout_ms(),
            receive_buffer_size: default_receive_buffer_size(),
        }
    }
}

// ============================================================================
// Default value functions
// ============================================================================

fn default_name() -> String {
    "bbfe-bridge".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT.as_millis() as u64
}

fn default_receive_buffer_size() -> usize {
    RECEIVE_BUFFER_SIZE
}

// ============================================================================
// Configuration Loading and Validation
// ============================================================================

impl BridgeConfig {
    /// Load from [`DEFAULT_CONFIG_PATH`] and the environment.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path
    ///
    /// Precedence, highest first: `BBFE_` environment variables, the file,
    /// built-in defaults. A missing file is not an error.
    ///
    /// # Errors
    ///
    /// Returns a ConfigError if the file is invalid or validation fails.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config: Self = Self::figment(path.as_ref()).extract()?;
        config.validate()?;
        Ok(config)
    }

    fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Validate configuration after loading
    ///
    /// Checks the log level, a positive timeout and a usable receive buffer.
    /// An empty host is allowed; it must be supplied before initializing.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            )));
        }

        if self.instrument.port == 0 {
            return Err(ConfigError::ValidationError(
                "Invalid port 0. Must be 1-65535".to_string(),
            ));
        }

        if self.instrument.timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "Invalid timeout_ms 0. Must be positive".to_string(),
            ));
        }

        if self.instrument.receive_buffer_size < 64 {
            return Err(ConfigError::ValidationError(format!(
                "Invalid receive_buffer_size {}. Must be at least 64",
                self.instrument.receive_buffer_size
            )));
        }

        Ok(())
    }
}

impl InstrumentConfig {
    /// Link bounds derived from this configuration.
    pub fn link_settings(&self) -> LinkSettings {
        LinkSettings {
            timeout: Duration::from_millis(self.timeout_ms),
            receive_buffer_size: self.receive_buffer_size,
        }
    }
}
