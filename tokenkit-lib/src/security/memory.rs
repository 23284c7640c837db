//! In-memory crypto engine.
//!
//! Keys live only for the lifetime of the process. Secret bytes are wiped on
//! drop. Suitable for tests, short-lived tools and as a reference for real
//! key custody backends.
//!
//! # Thread Safety
//!
//! This engine uses `RwLock` for thread-safe access. Lock poisoning is
//! surfaced as an error rather than a panic.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use ed25519_dalek::SigningKey;
use rand::rngs::OsRng;
use zeroize::Zeroizing;

use super::engine::{select_key_for_level, CryptoEngine};
use super::key::{now_ms, Key, KeyAlgorithm, KeyLevel};
use super::signer::{Ed25519Signer, Ed25519Verifier, Signer, Verifier};
use crate::{Result, TokenkitError};

struct StoredKey {
    secret: Zeroizing<[u8; 32]>,
    key: Key,
}

/// In-memory implementation of [`CryptoEngine`].
pub struct InMemoryCryptoEngine {
    keys: RwLock<HashMap<String, StoredKey>>,
    key_lifetime_ms: Option<u64>,
}

fn lock_error(context: &str) -> TokenkitError {
    TokenkitError::Internal(format!(
        "InMemoryCryptoEngine: lock poisoned during {context}"
    ))
}

impl InMemoryCryptoEngine {
    pub fn new() -> Self {
        Self {
            keys: RwLock::new(HashMap::new()),
            key_lifetime_ms: None,
        }
    }

    /// Keys generated from now on expire `lifetime_ms` after creation.
    pub fn with_key_lifetime(mut self, lifetime_ms: u64) -> Self {
        self.key_lifetime_ms = Some(lifetime_ms);
        self
    }

    /// Number of retained keys. Returns 0 if the lock is poisoned.
    pub fn len(&self) -> usize {
        self.keys.read().map(|k| k.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn signer_from(stored: &StoredKey) -> Arc<dyn Signer> {
        let signing_key = SigningKey::from_bytes(&stored.secret);
        Arc::new(Ed25519Signer::new(
            stored.key.id.clone(),
            stored.key.level,
            signing_key,
        ))
    }
}

impl std::fmt::Debug for InMemoryCryptoEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryCryptoEngine")
            .field("keys", &self.len())
            .field("key_lifetime_ms", &self.key_lifetime_ms)
            .finish_non_exhaustive()
    }
}

impl Default for InMemoryCryptoEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl CryptoEngine for InMemoryCryptoEngine {
    fn generate_key(&self, level: KeyLevel) -> Result<Key> {
        let signing_key = SigningKey::generate(&mut OsRng);
        let expires_at_ms = self.key_lifetime_ms.map(|ttl| now_ms().saturating_add(ttl));
        let key = Key::new(
            KeyAlgorithm::Ed25519,
            level,
            signing_key.verifying_key().as_bytes(),
            expires_at_ms,
        );

        let mut keys = self.keys.write().map_err(|_| lock_error("generate_key"))?;
        keys.insert(
            key.id.clone(),
            StoredKey {
                secret: Zeroizing::new(signing_key.to_bytes()),
                key: key.clone(),
            },
        );
        #[cfg(feature = "tracing")]
        tracing::debug!(key_id = %key.id, %level, "generated key");
        Ok(key)
    }

    fn signer_for_level(&self, level: KeyLevel) -> Result<Arc<dyn Signer>> {
        let keys = self.keys.read().map_err(|_| lock_error("signer_for_level"))?;
        let chosen = select_key_for_level(keys.values().map(|s| &s.key), level, now_ms())
            .ok_or_else(|| TokenkitError::no_key_at_level(level))?;
        let stored = keys
            .get(&chosen.id)
            .ok_or_else(|| TokenkitError::Internal("selected key vanished".into()))?;
        Ok(Self::signer_from(stored))
    }

    fn signer_for_key(&self, key_id: &str) -> Result<Arc<dyn Signer>> {
        let keys = self.keys.read().map_err(|_| lock_error("signer_for_key"))?;
        let stored = keys
            .get(key_id)
            .ok_or_else(|| TokenkitError::KeyUnavailable(format!("unknown key {key_id}")))?;
        if stored.key.is_expired(now_ms()) {
            return Err(TokenkitError::KeyUnavailable(format!("key {key_id} expired")));
        }
        Ok(Self::signer_from(stored))
    }

    fn verifier_for_key(&self, key_id: &str) -> Result<Arc<dyn Verifier>> {
        let keys = self.keys.read().map_err(|_| lock_error("verifier_for_key"))?;
        let stored = keys
            .get(key_id)
            .ok_or_else(|| TokenkitError::KeyUnavailable(format!("unknown key {key_id}")))?;
        Ok(Arc::new(Ed25519Verifier::from_key(&stored.key)?))
    }

    fn list_keys(&self) -> Result<Vec<Key>> {
        let keys = self.keys.read().map_err(|_| lock_error("list_keys"))?;
        let mut listed: Vec<Key> = keys.values().map(|s| s.key.clone()).collect();
        listed.sort_by(|a, b| a.level.cmp(&b.level).then_with(|| a.id.cmp(&b.id)));
        Ok(listed)
    }

    fn delete_keys(&self) -> Result<()> {
        let mut keys = self.keys.write().map_err(|_| lock_error("delete_keys"))?;
        keys.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signer_for_level_round_trips_through_verifier() {
        let engine = InMemoryCryptoEngine::new();
        let key = engine.generate_key(KeyLevel::Standard).unwrap();

        let signer = engine.signer_for_level(KeyLevel::Low).unwrap();
        assert_eq!(signer.key_id(), key.id);
        let signature = signer.sign(b"hello").unwrap();
        engine
            .verifier_for_key(&key.id)
            .unwrap()
            .verify(b"hello", &signature)
            .unwrap();
    }

    #[test]
    fn missing_level_is_key_unavailable() {
        let engine = InMemoryCryptoEngine::new();
        engine.generate_key(KeyLevel::Low).unwrap();
        let err = engine.signer_for_level(KeyLevel::Privileged).unwrap_err();
        assert!(matches!(err, TokenkitError::KeyUnavailable(_)));
    }

    #[test]
    fn expired_keys_produce_no_signers() {
        let engine = InMemoryCryptoEngine::new().with_key_lifetime(0);
        let key = engine.generate_key(KeyLevel::Privileged).unwrap();
        assert!(engine.signer_for_level(KeyLevel::Low).is_err());
        assert!(engine.signer_for_key(&key.id).is_err());
    }

    #[test]
    fn debug_shows_key_count_only() {
        let engine = InMemoryCryptoEngine::new().with_key_lifetime(60_000);
        let key = engine.generate_key(KeyLevel::Standard).unwrap();

        let printed = format!("{engine:?}");
        assert!(printed.starts_with("InMemoryCryptoEngine"));
        assert!(printed.contains("keys: 1"));
        assert!(printed.contains("key_lifetime_ms: Some(60000)"));
        assert!(!printed.contains(&key.id));
        assert!(!printed.contains("secret"));
    }

    #[test]
    fn list_and_delete() {
        let engine = InMemoryCryptoEngine::new();
        engine.generate_key(KeyLevel::Privileged).unwrap();
        engine.generate_key(KeyLevel::Low).unwrap();

        let keys = engine.list_keys().unwrap();
        assert_eq!(keys.len(), 2);
        assert_eq!(keys[0].level, KeyLevel::Low);

        engine.delete_keys().unwrap();
        assert!(engine.is_empty());
    }
}
