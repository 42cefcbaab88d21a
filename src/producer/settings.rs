//! Effective client settings: the producer cache key
//!
//! A `ClientSettings` value is the canonical form of "which producer does
//! this request need": request fields merged with process-wide defaults
//! into an order-independent entry set. Requests that resolve to the same
//! effective configuration compare equal and therefore share one producer.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::PublishConfig;

/// Client configuration entry keys (broker client convention)
pub const BOOTSTRAP_SERVERS: &str = "bootstrap.servers";
pub const KEY_SERIALIZER: &str = "key.serializer";
pub const VALUE_SERIALIZER: &str = "value.serializer";
pub const REQUEST_TIMEOUT_MS: &str = "request.timeout.ms";
pub const MAX_BLOCK_MS: &str = "max.block.ms";
pub const SECURITY_PROTOCOL: &str = "security.protocol";
pub const SASL_MECHANISM: &str = "sasl.mechanism";
pub const SASL_JAAS_CONFIG: &str = "sasl.jaas.config";

/// Serializer identifier fixed for every producer's value side
pub const STRING_SERIALIZER: &str = "org.apache.kafka.common.serialization.StringSerializer";

const JAAS_LOGIN_MODULE: &str = "org.apache.kafka.common.security.plain.PlainLoginModule";

/// One publish request as handed in by the pipeline
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PublishRequest {
    /// Broker endpoints, joined in the given order
    pub bootstrap_servers: Vec<String>,
    /// Serializer identifier for the record key side
    pub key_serializer: String,
    /// Per-request override of the configured request timeout
    #[serde(default)]
    pub request_timeout_ms: Option<u64>,
    /// Per-request override of the configured max-block time
    #[serde(default)]
    pub max_block_ms: Option<u64>,
}

/// Immutable, order-independent client settings.
///
/// Equality and hashing are structural over the entry set, so insertion
/// order can never influence whether two requests share a producer.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct ClientSettings {
    entries: BTreeMap<String, String>,
}

impl ClientSettings {
    /// Derive the effective settings for one request.
    ///
    /// Pure: identical request and defaults always produce an equal value.
    /// Security entries are only present when a security protocol is
    /// configured process-wide; an unset or empty protocol adds none.
    pub fn for_request(request: &PublishRequest, defaults: &PublishConfig) -> Self {
        let mut entries = BTreeMap::new();

        entries.insert(
            BOOTSTRAP_SERVERS.to_string(),
            request.bootstrap_servers.join(","),
        );
        entries.insert(KEY_SERIALIZER.to_string(), request.key_serializer.clone());
        entries.insert(VALUE_SERIALIZER.to_string(), STRING_SERIALIZER.to_string());

        let request_timeout_ms = request
            .request_timeout_ms
            .unwrap_or(defaults.request_timeout_ms);
        let max_block_ms = request.max_block_ms.unwrap_or(defaults.max_block_ms);
        entries.insert(REQUEST_TIMEOUT_MS.to_string(), request_timeout_ms.to_string());
        entries.insert(MAX_BLOCK_MS.to_string(), max_block_ms.to_string());

        if let Some(protocol) = defaults
            .security_protocol
            .as_deref()
            .filter(|protocol| !protocol.is_empty())
        {
            entries.insert(SECURITY_PROTOCOL.to_string(), protocol.to_string());
            entries.insert(SASL_MECHANISM.to_string(), defaults.sasl_mechanism.clone());
            entries.insert(
                SASL_JAAS_CONFIG.to_string(),
                format!(
                    "{JAAS_LOGIN_MODULE} required username=\"{}\" password=\"{}\";",
                    defaults.sasl_username, defaults.sasl_password
                ),
            );
        }

        Self { entries }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in key order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.entries
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }
}

fn redact<'a>(key: &str, value: &'a str) -> &'a str {
    if key == SASL_JAAS_CONFIG {
        "[redacted]"
    } else {
        value
    }
}

/// Key-ordered `key=value` rendering with credentials redacted; safe to log
impl fmt::Display for ClientSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (key, value) in &self.entries {
            if !first {
                f.write_str(" ")?;
            }
            write!(f, "{key}={}", redact(key, value))?;
            first = false;
        }
        Ok(())
    }
}

// Hand-written so credentials stay out of debug output as well
impl fmt::Debug for ClientSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (key, value) in &self.entries {
            map.entry(&key, &redact(key, value));
        }
        map.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn request(servers: &[&str]) -> PublishRequest {
        PublishRequest {
            bootstrap_servers: servers.iter().map(|s| s.to_string()).collect(),
            key_serializer: STRING_SERIALIZER.to_string(),
            request_timeout_ms: None,
            max_block_ms: None,
        }
    }

    fn secured_defaults() -> PublishConfig {
        PublishConfig {
            security_protocol: Some("SASL_SSL".to_string()),
            sasl_username: "svc-publisher".to_string(),
            sasl_password: "hunter2".to_string(),
            ..PublishConfig::default()
        }
    }

    #[test]
    fn test_defaults_fill_missing_overrides() {
        let settings = ClientSettings::for_request(&request(&["broker-1:9092"]), &PublishConfig::default());

        assert_eq!(settings.get(BOOTSTRAP_SERVERS), Some("broker-1:9092"));
        assert_eq!(settings.get(KEY_SERIALIZER), Some(STRING_SERIALIZER));
        assert_eq!(settings.get(VALUE_SERIALIZER), Some(STRING_SERIALIZER));
        assert_eq!(settings.get(REQUEST_TIMEOUT_MS), Some("100"));
        assert_eq!(settings.get(MAX_BLOCK_MS), Some("500"));
        assert_eq!(settings.len(), 5);
    }

    #[test]
    fn test_override_equal_to_default_yields_equal_settings() {
        let defaults = PublishConfig::default();
        let implicit = request(&["broker-1:9092"]);
        let mut explicit = request(&["broker-1:9092"]);
        explicit.request_timeout_ms = Some(defaults.request_timeout_ms);
        explicit.max_block_ms = Some(defaults.max_block_ms);

        assert_eq!(
            ClientSettings::for_request(&implicit, &defaults),
            ClientSettings::for_request(&explicit, &defaults)
        );
    }

    #[test]
    fn test_different_effective_values_yield_different_settings() {
        let defaults = PublishConfig::default();
        let base = request(&["broker-1:9092"]);
        let mut slower = request(&["broker-1:9092"]);
        slower.request_timeout_ms = Some(750);

        let base = ClientSettings::for_request(&base, &defaults);
        let slower = ClientSettings::for_request(&slower, &defaults);

        assert_ne!(base, slower);
        assert_eq!(slower.get(REQUEST_TIMEOUT_MS), Some("750"));
    }

    #[test]
    fn test_equal_settings_share_a_map_slot() {
        let defaults = PublishConfig::default();
        let first = ClientSettings::for_request(&request(&["a:9092", "b:9092"]), &defaults);
        let second = ClientSettings::for_request(&request(&["a:9092", "b:9092"]), &defaults);

        let mut map = HashMap::new();
        map.insert(first, 1);
        map.insert(second, 2);
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_bootstrap_servers_joined_in_request_order() {
        let settings =
            ClientSettings::for_request(&request(&["a:9092", "b:9092"]), &PublishConfig::default());
        assert_eq!(settings.get(BOOTSTRAP_SERVERS), Some("a:9092,b:9092"));
    }

    #[test]
    fn test_unset_security_protocol_adds_no_auth_entries() {
        let settings = ClientSettings::for_request(&request(&["broker-1:9092"]), &PublishConfig::default());

        assert!(!settings.contains(SECURITY_PROTOCOL));
        assert!(!settings.contains(SASL_MECHANISM));
        assert!(!settings.contains(SASL_JAAS_CONFIG));
    }

    #[test]
    fn test_empty_security_protocol_means_unset() {
        let defaults = PublishConfig {
            security_protocol: Some(String::new()),
            ..PublishConfig::default()
        };
        let settings = ClientSettings::for_request(&request(&["broker-1:9092"]), &defaults);

        assert!(!settings.contains(SECURITY_PROTOCOL));
        assert!(!settings.contains(SASL_JAAS_CONFIG));
    }

    #[test]
    fn test_security_protocol_adds_auth_trio() {
        let settings = ClientSettings::for_request(&request(&["broker-1:9092"]), &secured_defaults());

        assert_eq!(settings.get(SECURITY_PROTOCOL), Some("SASL_SSL"));
        assert_eq!(settings.get(SASL_MECHANISM), Some("PLAIN"));
        assert_eq!(
            settings.get(SASL_JAAS_CONFIG),
            Some(
                "org.apache.kafka.common.security.plain.PlainLoginModule required \
                 username=\"svc-publisher\" password=\"hunter2\";"
            )
        );
    }

    #[test]
    fn test_display_and_debug_redact_credentials() {
        let settings = ClientSettings::for_request(&request(&["broker-1:9092"]), &secured_defaults());

        let display = settings.to_string();
        assert!(display.contains("security.protocol=SASL_SSL"));
        assert!(display.contains("sasl.jaas.config=[redacted]"));
        assert!(!display.contains("hunter2"));

        let debug = format!("{settings:?}");
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("[redacted]"));
    }

    #[test]
    fn test_request_deserializes_with_missing_overrides() {
        let request: PublishRequest = serde_json::from_str(
            r#"{
                "bootstrap_servers": ["broker-1:9092"],
                "key_serializer": "org.apache.kafka.common.serialization.StringSerializer"
            }"#,
        )
        .unwrap();

        assert_eq!(request.bootstrap_servers, vec!["broker-1:9092"]);
        assert_eq!(request.request_timeout_ms, None);
        assert_eq!(request.max_block_ms, None);
    }
}
