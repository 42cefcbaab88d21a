use super::models::Config;
use config::{ConfigError, Environment, File};
use std::env;
use std::path::PathBuf;

const CONFIG_ENV_VAR: &str = "STREAMBOX_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config/streambox.toml";
const ENV_PREFIX: &str = "STREAMBOX";
const ENV_SEPARATOR: &str = "__";

/// Load configuration from multiple sources with priority:
/// 1. Defaults (embedded in structs)
/// 2. TOML file (if exists)
/// 3. Environment variables from .env file (via dotenvy)
/// 4. System environment variables (highest priority)
pub fn load() -> Result<Config, ConfigError> {
    // Load .env file if it exists (ignore errors if file doesn't exist)
    let _ = dotenvy::dotenv();

    let config_path = env::var(CONFIG_ENV_VAR)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));

    let mut config = load_from_sources(config_path)?;

    // Load secrets from environment variables
    load_secrets(&mut config);

    Ok(config)
}

/// Load secrets from environment variables into config
/// Secrets are never stored in TOML files, only in environment
fn load_secrets(config: &mut Config) {
    load_secrets_with(|name| env::var(name).ok(), config);
}

/// `STREAMBOX_SASL_*` wins; the broker-style `KAFKA_SASL_*` names are
/// only consulted while the credential is still empty.
fn load_secrets_with(lookup: impl Fn(&str) -> Option<String>, config: &mut Config) {
    // Load SASL credentials
    if let Some(username) = lookup("STREAMBOX_SASL_USERNAME") {
        config.publish.sasl_username = username;
    }
    if let Some(password) = lookup("STREAMBOX_SASL_PASSWORD") {
        config.publish.sasl_password = password;
    }

    // Alternative: broker-style environment variable names
    if config.publish.sasl_username.is_empty() {
        if let Some(username) = lookup("KAFKA_SASL_USERNAME") {
            config.publish.sasl_username = username;
        }
    }
    if config.publish.sasl_password.is_empty() {
        if let Some(password) = lookup("KAFKA_SASL_PASSWORD") {
            config.publish.sasl_password = password;
        }
    }
}

/// Load configuration from a specific path and environment
/// Useful for testing with custom config files
pub fn load_from_sources(config_path: PathBuf) -> Result<Config, ConfigError> {
    let mut builder = config::Config::builder();

    // Start with defaults (handled by struct Default implementations)
    // Add TOML file if it exists (optional)
    if config_path.exists() {
        tracing::info!("Loading configuration from: {}", config_path.display());
        builder = builder.add_source(File::from(config_path).required(false));
    } else {
        tracing::warn!(
            "Configuration file not found at {}, using defaults and environment overrides",
            config_path.display()
        );
    }

    // Add environment variable overrides
    // STREAMBOX__PUBLISH__REQUEST_TIMEOUT_MS -> publish.request_timeout_ms
    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator(ENV_SEPARATOR)
            .try_parsing(true),
    );

    let config = builder.build()?;
    config.try_deserialize()
}
