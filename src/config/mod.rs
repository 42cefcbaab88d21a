//! Configuration management for streambox
//!
//! This module provides a layered configuration system that loads settings from:
//! 1. Default values (embedded in structs)
//! 2. TOML configuration file
//! 3. Environment variables (highest priority)
//!
//! # Usage
//!
//! ```no_run
//! use streambox::config::Config;
//!
//! let config = Config::load().expect("Failed to load configuration");
//! println!("Producer cache capacity: {}", config.cache.max_producers);
//! ```
//!
//! # Environment Variables
//!
//! Configuration can be overridden using environment variables with the pattern:
//! `STREAMBOX__<section>__<key>`
//!
//! Examples:
//! - `STREAMBOX__PUBLISH__REQUEST_TIMEOUT_MS=250`
//! - `STREAMBOX__PUBLISH__SECURITY_PROTOCOL=SASL_SSL`
//! - `STREAMBOX__CACHE__MAX_PRODUCERS=20`
//!
//! SASL credentials are not part of the file schema at all; they are read
//! from `STREAMBOX_SASL_USERNAME` / `STREAMBOX_SASL_PASSWORD` (with
//! `KAFKA_SASL_USERNAME` / `KAFKA_SASL_PASSWORD` as fallbacks).
//!
//! # Configuration File
//!
//! By default, the configuration is loaded from `config/streambox.toml`.
//! This can be overridden using the `STREAMBOX_CONFIG` environment variable.

mod models;
mod sources;

// Re-export public types
pub use models::{CacheConfig, Config, PublishConfig};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),
}

impl Config {
    /// Load configuration from all sources (file + environment)
    ///
    /// Configuration is loaded with the following priority (highest to lowest):
    /// 1. Environment variables (`STREAMBOX__*`)
    /// 2. TOML file (default: `config/streambox.toml`)
    /// 3. Default values
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file is malformed.
    pub fn load() -> Result<Self, ConfigError> {
        let config = sources::load()?;
        Ok(config)
    }

    /// Load configuration from a specific path
    ///
    /// Useful for testing with custom configuration files.
    pub fn load_from_path(path: std::path::PathBuf) -> Result<Self, ConfigError> {
        let config = sources::load_from_sources(path)?;
        Ok(config)
    }
}
