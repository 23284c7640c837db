//! Signing and verification capabilities.

use ed25519_dalek::{Signature, Signer as _, SigningKey, Verifier as _, VerifyingKey};

use super::key::{Key, KeyAlgorithm, KeyLevel};
use crate::{Result, TokenkitError};

/// A signing capability bound to a single key.
pub trait Signer: Send + Sync + std::fmt::Debug {
    /// Id of the key this signer uses.
    fn key_id(&self) -> &str;

    /// Privilege level of the key.
    fn level(&self) -> KeyLevel;

    /// Sign `message`, returning raw signature bytes.
    fn sign(&self, message: &[u8]) -> Result<Vec<u8>>;
}

/// A verification capability bound to a single key.
pub trait Verifier: Send + Sync + std::fmt::Debug {
    fn key_id(&self) -> &str;

    /// Verify `signature` over `message`.
    fn verify(&self, message: &[u8], signature: &[u8]) -> Result<()>;
}

/// Ed25519 signer over an in-memory secret key.
pub struct Ed25519Signer {
    key_id: String,
    level: KeyLevel,
    signing_key: SigningKey,
}

impl Ed25519Signer {
    pub fn new(key_id: impl Into<String>, level: KeyLevel, signing_key: SigningKey) -> Self {
        Self {
            key_id: key_id.into(),
            level,
            signing_key,
        }
    }
}

impl Signer for Ed25519Signer {
    fn key_id(&self) -> &str {
        &self.key_id
    }

    fn level(&self) -> KeyLevel {
        self.level
    }

    fn sign(&self, message: &[u8]) -> Result<Vec<u8>> {
        Ok(self.signing_key.sign(message).to_bytes().to_vec())
    }
}

impl std::fmt::Debug for Ed25519Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ed25519Signer")
            .field("key_id", &self.key_id)
            .field("level", &self.level)
            .finish_non_exhaustive()
    }
}

/// Ed25519 verifier built from public key material only.
#[derive(Debug, Clone)]
pub struct Ed25519Verifier {
    key_id: String,
    verifying_key: VerifyingKey,
}

impl Ed25519Verifier {
    /// Build a verifier for an issued key record.
    pub fn from_key(key: &Key) -> Result<Self> {
        let KeyAlgorithm::Ed25519 = key.algorithm;
        let bytes: [u8; 32] = key
            .public_key_bytes()?
            .try_into()
            .map_err(|_| TokenkitError::Crypto("ed25519 public key must be 32 bytes".into()))?;
        let verifying_key = VerifyingKey::from_bytes(&bytes)
            .map_err(|e| TokenkitError::Crypto(format!("invalid public key: {e}")))?;
        Ok(Self {
            key_id: key.id.clone(),
            verifying_key,
        })
    }
}

impl Verifier for Ed25519Verifier {
    fn key_id(&self) -> &str {
        &self.key_id
    }

    fn verify(&self, message: &[u8], signature: &[u8]) -> Result<()> {
        let bytes: [u8; 64] = signature
            .try_into()
            .map_err(|_| TokenkitError::Crypto("invalid signature length".into()))?;
        self.verifying_key
            .verify(message, &Signature::from_bytes(&bytes))
            .map_err(|_| TokenkitError::Crypto(format!("signature mismatch for key {}", self.key_id)))
    }
}
