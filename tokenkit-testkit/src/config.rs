//! Policy knobs of the simulated platform.

use serde::{Deserialize, Serialize};
use tokenkit_lib::policy::AuthorizationPolicy;
use tokenkit_lib::ClientConfig;

/// Platform-side policy. Defaults match [`ClientConfig::default`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlatformConfig {
    #[serde(default = "default_realm")]
    pub realm: String,

    #[serde(default = "default_scheme")]
    pub scheme: String,

    /// Maximum distance between an envelope's `created-at-ms` and now.
    #[serde(default = "default_freshness_window_ms")]
    pub freshness_window_ms: u64,

    /// Re-adding a key with the same id and material is a no-op when true,
    /// and `ALREADY_EXISTS` when false.
    #[serde(default = "default_add_key_idempotent")]
    pub add_key_idempotent: bool,

    #[serde(default)]
    pub policy: AuthorizationPolicy,
}

fn default_realm() -> String {
    ClientConfig::default().realm
}

fn default_scheme() -> String {
    ClientConfig::default().scheme
}

fn default_freshness_window_ms() -> u64 {
    5 * 60 * 1000
}

fn default_add_key_idempotent() -> bool {
    true
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            realm: default_realm(),
            scheme: default_scheme(),
            freshness_window_ms: default_freshness_window_ms(),
            add_key_idempotent: default_add_key_idempotent(),
            policy: AuthorizationPolicy::default(),
        }
    }
}

impl PlatformConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_freshness_window_ms(mut self, window_ms: u64) -> Self {
        self.freshness_window_ms = window_ms;
        self
    }

    pub fn with_add_key_idempotent(mut self, idempotent: bool) -> Self {
        self.add_key_idempotent = idempotent;
        self
    }

    pub fn with_policy(mut self, policy: AuthorizationPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_realm(mut self, realm: impl Into<String>) -> Self {
        self.realm = realm.into();
        self
    }
}
