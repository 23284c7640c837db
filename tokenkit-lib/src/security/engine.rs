//! The crypto engine seam.

use std::sync::Arc;

use super::key::{Key, KeyLevel};
use super::signer::{Signer, Verifier};
use crate::Result;

/// Key custody for one member: generates keys and hands out signers.
///
/// Implementations decide where secret material lives (memory, secure
/// enclave, HSM). The protocol code only ever sees [`Signer`] and
/// [`Verifier`] capabilities.
pub trait CryptoEngine: Send + Sync {
    /// Generate and retain a new key at `level`.
    fn generate_key(&self, level: KeyLevel) -> Result<Key>;

    /// A signer whose key level satisfies `level`.
    ///
    /// Fails with [`crate::TokenkitError::KeyUnavailable`] when no unexpired
    /// key qualifies. Never falls back to a lower level.
    fn signer_for_level(&self, level: KeyLevel) -> Result<Arc<dyn Signer>>;

    /// A signer for a specific key.
    fn signer_for_key(&self, key_id: &str) -> Result<Arc<dyn Signer>>;

    /// A verifier for a specific key held by this engine.
    fn verifier_for_key(&self, key_id: &str) -> Result<Arc<dyn Verifier>>;

    /// Public records of every retained key.
    fn list_keys(&self) -> Result<Vec<Key>>;

    /// Forget all retained keys.
    fn delete_keys(&self) -> Result<()>;
}

/// Pick the key that should serve a request at `level`.
///
/// Prefers an exact level match, then the lowest level above it. Expired keys
/// are never chosen.
pub fn select_key_for_level<'a, I>(keys: I, level: KeyLevel, now_ms: u64) -> Option<&'a Key>
where
    I: IntoIterator<Item = &'a Key>,
{
    keys.into_iter()
        .filter(|key| key.level.satisfies(level) && !key.is_expired(now_ms))
        .min_by(|a, b| a.level.cmp(&b.level).then_with(|| a.id.cmp(&b.id)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::KeyAlgorithm;
    use proptest::prelude::*;

    fn key(level: KeyLevel, seed: u8, expires_at_ms: Option<u64>) -> Key {
        Key::new(KeyAlgorithm::Ed25519, level, &[seed; 32], expires_at_ms)
    }

    #[test]
    fn exact_level_preferred() {
        let keys = vec![
            key(KeyLevel::Privileged, 1, None),
            key(KeyLevel::Standard, 2, None),
            key(KeyLevel::Low, 3, None),
        ];
        let chosen = select_key_for_level(&keys, KeyLevel::Standard, 0).unwrap();
        assert_eq!(chosen.level, KeyLevel::Standard);
    }

    #[test]
    fn falls_upward_never_downward() {
        let keys = vec![key(KeyLevel::Privileged, 1, None), key(KeyLevel::Low, 3, None)];
        let chosen = select_key_for_level(&keys, KeyLevel::Standard, 0).unwrap();
        assert_eq!(chosen.level, KeyLevel::Privileged);

        let only_low = vec![key(KeyLevel::Low, 3, None)];
        assert!(select_key_for_level(&only_low, KeyLevel::Standard, 0).is_none());
    }

    #[test]
    fn expired_keys_are_skipped() {
        let keys = vec![
            key(KeyLevel::Low, 1, Some(100)),
            key(KeyLevel::Standard, 2, None),
        ];
        let chosen = select_key_for_level(&keys, KeyLevel::Low, 500).unwrap();
        assert_eq!(chosen.level, KeyLevel::Standard);
    }

    fn any_level() -> impl Strategy<Value = KeyLevel> {
        prop::sample::select(KeyLevel::ALL.to_vec())
    }

    proptest! {
        #[test]
        fn selection_never_goes_below_the_request(
            held in prop::collection::vec((any_level(), any::<bool>()), 0..6),
            wanted in any_level(),
        ) {
            let keys: Vec<Key> = held
                .iter()
                .enumerate()
                .map(|(i, (level, expired))| key(*level, i as u8, expired.then_some(100)))
                .collect();

            let eligible: Vec<&Key> = keys
                .iter()
                .filter(|k| k.level.satisfies(wanted) && !k.is_expired(500))
                .collect();
            match select_key_for_level(&keys, wanted, 500) {
                Some(chosen) => {
                    prop_assert!(chosen.level.satisfies(wanted));
                    prop_assert!(!chosen.is_expired(500));
                    prop_assert!(eligible.iter().all(|k| chosen.level <= k.level));
                }
                None => prop_assert!(eligible.is_empty()),
            }
        }
    }
}
