//! Canonical token signing.

use serde::{Deserialize, Serialize};

use super::payload::TokenPayload;
use crate::canonical::to_canonical_bytes;
use crate::security::{Signer, Verifier};
use crate::{MemberId, Result, TokenkitError};

/// Joins the canonical payload and the action tag.
pub const ACTION_SEPARATOR: u8 = b'.';

/// What a token signature asserts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenAction {
    Endorsed,
    Cancelled,
}

impl TokenAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Endorsed => "endorsed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for TokenAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The exact bytes signed for `action` over `payload`.
///
/// Bound to the payload content, never to the token id.
pub fn canonical_signing_bytes(payload: &TokenPayload, action: TokenAction) -> Result<Vec<u8>> {
    let mut bytes = to_canonical_bytes(payload)?;
    bytes.push(ACTION_SEPARATOR);
    bytes.extend_from_slice(action.as_str().as_bytes());
    Ok(bytes)
}

/// A signature appended to a token. Never removed once accepted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSignature {
    pub member_id: MemberId,
    pub key_id: String,
    /// Hex-encoded signature over [`canonical_signing_bytes`].
    pub signature: String,
    pub action: TokenAction,
}

impl TokenSignature {
    /// Sign `payload` for `action` on behalf of `member_id`.
    pub fn sign(
        member_id: MemberId,
        payload: &TokenPayload,
        action: TokenAction,
        signer: &dyn Signer,
    ) -> Result<Self> {
        let signature = signer.sign(&canonical_signing_bytes(payload, action)?)?;
        Ok(Self {
            member_id,
            key_id: signer.key_id().to_string(),
            signature: hex::encode(signature),
            action,
        })
    }

    pub fn verify(&self, payload: &TokenPayload, verifier: &dyn Verifier) -> Result<()> {
        if verifier.key_id() != self.key_id {
            return Err(TokenkitError::Crypto(format!(
                "signature names key {} but verifier holds {}",
                self.key_id,
                verifier.key_id()
            )));
        }
        let raw = hex::decode(&self.signature)
            .map_err(|e| TokenkitError::invalid_data("signature", e.to_string()))?;
        verifier.verify(&canonical_signing_bytes(payload, self.action)?, &raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::{CryptoEngine, InMemoryCryptoEngine, KeyLevel};
    use crate::token::TokenPayloadBuilder;
    use rust_decimal_macros::dec;

    fn payload(nonce: &str) -> TokenPayload {
        TokenPayloadBuilder::transfer(MemberId::new("m:a"), "EUR", dec!(5))
            .to_member(MemberId::new("m:b"))
            .nonce(nonce)
            .ref_id("ref-1")
            .effective_at_ms(1_700_000_000_000)
            .build()
            .unwrap()
    }

    #[test]
    fn signing_bytes_end_with_action_tag() {
        let p = payload("n1");
        let endorsed = canonical_signing_bytes(&p, TokenAction::Endorsed).unwrap();
        let cancelled = canonical_signing_bytes(&p, TokenAction::Cancelled).unwrap();
        assert!(endorsed.ends_with(b"}.endorsed"));
        assert!(cancelled.ends_with(b"}.cancelled"));
        assert_eq!(endorsed, canonical_signing_bytes(&p, TokenAction::Endorsed).unwrap());
    }

    #[test]
    fn signature_is_payload_bound() {
        let engine = InMemoryCryptoEngine::new();
        let key = engine.generate_key(KeyLevel::Standard).unwrap();
        let signer = engine.signer_for_key(&key.id).unwrap();
        let verifier = engine.verifier_for_key(&key.id).unwrap();

        let p = payload("n1");
        let sig = TokenSignature::sign(MemberId::new("m:a"), &p, TokenAction::Endorsed, signer.as_ref())
            .unwrap();
        sig.verify(&p, verifier.as_ref()).unwrap();
        assert!(sig.verify(&payload("n2"), verifier.as_ref()).is_err());

        let mut as_cancel = sig.clone();
        as_cancel.action = TokenAction::Cancelled;
        assert!(as_cancel.verify(&p, verifier.as_ref()).is_err());
    }

    #[test]
    fn action_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&TokenAction::Cancelled).unwrap(),
            "\"cancelled\""
        );
    }
}
