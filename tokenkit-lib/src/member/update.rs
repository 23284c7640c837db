//! Hash-chained member updates.
//!
//! A [`MemberUpdate`] names the hash it was built on (`prev_hash`). The
//! platform applies it only if that hash is still the member's `last_hash`,
//! and then advances the hash with [`MemberUpdate::chained_hash`]. An update
//! is applied all-or-nothing.

use serde::{Deserialize, Serialize};

use super::operation::{required_level_for, MemberOperation};
use crate::canonical::{sha256_hex, to_canonical_bytes};
use crate::security::{KeyLevel, Signer, Verifier};
use crate::{MemberId, Result, TokenkitError};

/// A batch of operations built against a specific member hash.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberUpdate {
    pub member_id: MemberId,
    pub prev_hash: String,
    pub operations: Vec<MemberOperation>,
}

/// Signature over a whole [`MemberUpdate`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateSignature {
    pub member_id: MemberId,
    pub key_id: String,
    /// Hex-encoded signature over the canonical update bytes.
    pub signature: String,
}

impl MemberUpdate {
    pub fn new(
        member_id: MemberId,
        prev_hash: impl Into<String>,
        operations: Vec<MemberOperation>,
    ) -> Self {
        Self {
            member_id,
            prev_hash: prev_hash.into(),
            operations,
        }
    }

    /// The genesis update of a freshly created member.
    pub fn genesis(member_id: MemberId, operations: Vec<MemberOperation>) -> Self {
        Self::new(member_id, "", operations)
    }

    /// Minimum key level that may sign this update.
    pub fn required_level(&self) -> KeyLevel {
        required_level_for(&self.operations)
    }

    /// The bytes that [`UpdateSignature`] covers.
    pub fn signing_bytes(&self) -> Result<Vec<u8>> {
        to_canonical_bytes(self)
    }

    /// Sign the update.
    ///
    /// Fails with `KeyUnavailable` if `signer` is below the level the
    /// operations require, and with `InvalidData` for an empty update.
    pub fn sign(&self, signer: &dyn Signer) -> Result<UpdateSignature> {
        if self.operations.is_empty() {
            return Err(TokenkitError::invalid_data("operations", "update is empty"));
        }
        let required = self.required_level();
        if !signer.level().satisfies(required) {
            return Err(TokenkitError::KeyUnavailable(format!(
                "key {} is {} but update requires {}",
                signer.key_id(),
                signer.level(),
                required
            )));
        }
        let signature = signer.sign(&self.signing_bytes()?)?;
        Ok(UpdateSignature {
            member_id: self.member_id.clone(),
            key_id: signer.key_id().to_string(),
            signature: hex::encode(signature),
        })
    }

    /// Check `signature` against this update.
    pub fn verify(&self, signature: &UpdateSignature, verifier: &dyn Verifier) -> Result<()> {
        if signature.member_id != self.member_id {
            return Err(TokenkitError::Crypto("update signed for another member".into()));
        }
        let raw = hex::decode(&signature.signature)
            .map_err(|e| TokenkitError::invalid_data("signature", e.to_string()))?;
        verifier.verify(&self.signing_bytes()?, &raw)
    }

    /// The member hash after this update is applied.
    pub fn chained_hash(&self) -> Result<String> {
        let mut material = self.prev_hash.as_bytes().to_vec();
        material.push(b'.');
        material.extend(self.signing_bytes()?);
        Ok(sha256_hex(&material))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::member::{Alias, MemberOperation};
    use crate::security::{CryptoEngine, InMemoryCryptoEngine};

    fn update(prev: &str) -> MemberUpdate {
        MemberUpdate::new(
            MemberId::new("m:alice"),
            prev,
            vec![MemberOperation::add_alias(&Alias::email("alice@example.com")).unwrap()],
        )
    }

    #[test]
    fn privileged_signature_verifies() {
        let engine = InMemoryCryptoEngine::new();
        let key = engine.generate_key(KeyLevel::Privileged).unwrap();
        let signer = engine.signer_for_level(KeyLevel::Privileged).unwrap();

        let update = update("h1");
        let signature = update.sign(signer.as_ref()).unwrap();
        assert_eq!(signature.key_id, key.id);

        let verifier = engine.verifier_for_key(&key.id).unwrap();
        update.verify(&signature, verifier.as_ref()).unwrap();

        let moved = update_with_prev(&update, "h2");
        assert!(moved.verify(&signature, verifier.as_ref()).is_err());
    }

    fn update_with_prev(update: &MemberUpdate, prev: &str) -> MemberUpdate {
        MemberUpdate::new(update.member_id.clone(), prev, update.operations.clone())
    }

    #[test]
    fn low_signer_cannot_sign_privileged_update() {
        let engine = InMemoryCryptoEngine::new();
        engine.generate_key(KeyLevel::Low).unwrap();
        let signer = engine.signer_for_level(KeyLevel::Low).unwrap();
        let err = update("h1").sign(signer.as_ref()).unwrap_err();
        assert!(matches!(err, TokenkitError::KeyUnavailable(_)));
    }

    #[test]
    fn empty_update_is_rejected() {
        let engine = InMemoryCryptoEngine::new();
        engine.generate_key(KeyLevel::Privileged).unwrap();
        let signer = engine.signer_for_level(KeyLevel::Privileged).unwrap();
        let empty = MemberUpdate::new(MemberId::new("m:x"), "h", vec![]);
        assert!(empty.sign(signer.as_ref()).is_err());
    }

    #[test]
    fn chained_hash_depends_on_base_and_operations() {
        let a = update("h1").chained_hash().unwrap();
        assert_eq!(a, update("h1").chained_hash().unwrap());
        assert_ne!(a, update("h2").chained_hash().unwrap());

        let other_ops = MemberUpdate::new(
            MemberId::new("m:alice"),
            "h1",
            vec![MemberOperation::remove_key("k1")],
        );
        assert_ne!(a, other_ops.chained_hash().unwrap());
    }
}
