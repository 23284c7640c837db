//! Client configuration.

use serde::{Deserialize, Serialize};

use crate::security::KeyLevel;

/// Configuration shared by every call a [`crate::Client`] makes.
///
/// `freshness_window_ms` and `add_key_idempotent` describe platform policy.
/// They are recorded here so callers can reason about retries, but the client
/// never enforces them.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Protocol realm placed in every envelope.
    #[serde(default = "default_realm")]
    pub realm: String,

    /// Signature scheme placed in every envelope.
    #[serde(default = "default_scheme")]
    pub scheme: String,

    /// Level of the key that signs the per-call envelope.
    #[serde(default = "default_auth_key_level")]
    pub auth_key_level: KeyLevel,

    /// Abandon waiting for a response after this many milliseconds.
    #[serde(default)]
    pub call_timeout_ms: Option<u64>,

    /// Platform signature freshness window, if known.
    #[serde(default)]
    pub freshness_window_ms: Option<u64>,

    /// Whether the platform treats a repeated AddKey for the same key as a no-op.
    #[serde(default = "default_add_key_idempotent")]
    pub add_key_idempotent: bool,
}

fn default_realm() -> String {
    "Token".to_string()
}

fn default_scheme() -> String {
    "Token-Ed25519-SHA512".to_string()
}

fn default_auth_key_level() -> KeyLevel {
    KeyLevel::Low
}

fn default_add_key_idempotent() -> bool {
    true
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            realm: default_realm(),
            scheme: default_scheme(),
            auth_key_level: default_auth_key_level(),
            call_timeout_ms: None,
            freshness_window_ms: None,
            add_key_idempotent: default_add_key_idempotent(),
        }
    }
}

impl ClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the realm.
    pub fn with_realm(mut self, realm: impl Into<String>) -> Self {
        self.realm = realm.into();
        self
    }

    /// Set the signature scheme.
    pub fn with_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = scheme.into();
        self
    }

    /// Set the level used to sign call envelopes.
    pub fn with_auth_key_level(mut self, level: KeyLevel) -> Self {
        self.auth_key_level = level;
        self
    }

    /// Set the caller-level call timeout.
    pub fn with_call_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.call_timeout_ms = Some(timeout_ms);
        self
    }

    /// Record the platform freshness window.
    pub fn with_freshness_window_ms(mut self, window_ms: u64) -> Self {
        self.freshness_window_ms = Some(window_ms);
        self
    }

    /// Record whether AddKey is idempotent on the platform.
    pub fn with_add_key_idempotent(mut self, idempotent: bool) -> Self {
        self.add_key_idempotent = idempotent;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_take_defaults() {
        let config: ClientConfig = serde_json::from_str(r#"{"call_timeout_ms": 2500}"#).unwrap();
        assert_eq!(config.realm, "Token");
        assert_eq!(config.auth_key_level, KeyLevel::Low);
        assert_eq!(config.call_timeout_ms, Some(2500));
        assert!(config.add_key_idempotent);
    }

    #[test]
    fn builder_setters() {
        let config = ClientConfig::new()
            .with_realm("sandbox")
            .with_auth_key_level(KeyLevel::Standard)
            .with_freshness_window_ms(60_000);
        assert_eq!(config.realm, "sandbox");
        assert_eq!(config.auth_key_level, KeyLevel::Standard);
        assert_eq!(config.freshness_window_ms, Some(60_000));
    }
}
