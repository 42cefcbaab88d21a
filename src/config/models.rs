use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub publish: PublishConfig,
    #[serde(default)]
    pub cache: CacheConfig,
}

/// Publish defaults applied to every producer built by the manager
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PublishConfig {
    /// Broker request timeout in milliseconds
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Upper bound on client-side blocking (metadata fetch, full buffers)
    #[serde(default = "default_max_block_ms")]
    pub max_block_ms: u64,
    /// Security protocol (e.g. "SASL_SSL"); unset or empty leaves the
    /// connection unauthenticated
    pub security_protocol: Option<String>,
    #[serde(default = "default_sasl_mechanism")]
    pub sasl_mechanism: String,
    /// SASL username (loaded from environment, not from config file)
    #[serde(skip)]
    pub sasl_username: String,
    /// SASL password (loaded from environment, not from config file)
    #[serde(skip)]
    pub sasl_password: String,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: default_request_timeout_ms(),
            max_block_ms: default_max_block_ms(),
            security_protocol: None,
            sasl_mechanism: default_sasl_mechanism(),
            sasl_username: String::new(),
            sasl_password: String::new(),
        }
    }
}

fn default_request_timeout_ms() -> u64 {
    100
}

fn default_max_block_ms() -> u64 {
    500
}

fn default_sasl_mechanism() -> String {
    "PLAIN".to_string()
}

/// Producer cache sizing
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    /// Maximum number of live producers held at once
    #[serde(default = "default_max_producers")]
    pub max_producers: usize,
    /// Idle duration after which an unused producer is discarded
    #[serde(default = "default_idle_timeout_ms")]
    pub idle_timeout_ms: u64,
}

impl CacheConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_producers: default_max_producers(),
            idle_timeout_ms: default_idle_timeout_ms(),
        }
    }
}

fn default_max_producers() -> usize {
    10
}

fn default_idle_timeout_ms() -> u64 {
    120_000
}
