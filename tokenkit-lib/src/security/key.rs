//! Key model: privilege levels, algorithms and issued public keys.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Privilege tier of a signing key.
///
/// Levels are totally ordered, `Low < Standard < Privileged`. An operation
/// that requires a level is satisfied by any key at that level or above.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum KeyLevel {
    Low,
    Standard,
    Privileged,
}

impl KeyLevel {
    /// All levels, lowest first.
    pub const ALL: [KeyLevel; 3] = [KeyLevel::Low, KeyLevel::Standard, KeyLevel::Privileged];

    /// Whether a key at this level may authorize something requiring `required`.
    pub fn satisfies(self, required: KeyLevel) -> bool {
        self >= required
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Standard => "STANDARD",
            Self::Privileged => "PRIVILEGED",
        }
    }
}

impl std::fmt::Display for KeyLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Signature algorithm of a key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum KeyAlgorithm {
    #[default]
    Ed25519,
}

/// An issued public key. Immutable once issued.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Key {
    pub id: String,
    pub algorithm: KeyAlgorithm,
    pub level: KeyLevel,
    /// Hex-encoded public key material.
    pub public_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at_ms: Option<u64>,
}

impl Key {
    /// Build a key record from raw public key bytes; the id is derived from them.
    pub fn new(
        algorithm: KeyAlgorithm,
        level: KeyLevel,
        public_key: &[u8],
        expires_at_ms: Option<u64>,
    ) -> Self {
        Self {
            id: key_id_for(public_key),
            algorithm,
            level,
            public_key: hex::encode(public_key),
            expires_at_ms,
        }
    }

    /// Whether the key has expired at `now_ms`.
    pub fn is_expired(&self, now_ms: u64) -> bool {
        self.expires_at_ms.is_some_and(|at| at <= now_ms)
    }

    /// Decode the public key material.
    pub fn public_key_bytes(&self) -> crate::Result<Vec<u8>> {
        hex::decode(&self.public_key)
            .map_err(|e| crate::TokenkitError::invalid_data("public_key", e.to_string()))
    }
}

/// Key ids are the hex of the first 16 bytes of SHA-256 over the public key.
pub fn key_id_for(public_key: &[u8]) -> String {
    let digest = Sha256::digest(public_key);
    hex::encode(&digest[..16])
}

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn now_ms() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_are_ordered() {
        assert!(KeyLevel::Low < KeyLevel::Standard);
        assert!(KeyLevel::Standard < KeyLevel::Privileged);
        assert!(KeyLevel::Privileged.satisfies(KeyLevel::Low));
        assert!(KeyLevel::Privileged.satisfies(KeyLevel::Standard));
        assert!(!KeyLevel::Low.satisfies(KeyLevel::Standard));
    }

    #[test]
    fn level_serializes_upper_case() {
        let json = serde_json::to_string(&KeyLevel::Privileged).unwrap();
        assert_eq!(json, "\"PRIVILEGED\"");
    }

    #[test]
    fn key_id_is_stable_and_expiry_is_inclusive() {
        let key = Key::new(KeyAlgorithm::Ed25519, KeyLevel::Low, &[7u8; 32], Some(1_000));
        assert_eq!(key.id, key_id_for(&[7u8; 32]));
        assert_eq!(key.id.len(), 32);
        assert!(!key.is_expired(999));
        assert!(key.is_expired(1_000));
        assert_eq!(key.public_key_bytes().unwrap(), vec![7u8; 32]);
    }
}
