//! Per-call request authentication.
//!
//! Every outgoing call carries a freshly signed envelope in its metadata:
//!
//! | header          | value                                              |
//! |-----------------|----------------------------------------------------|
//! | `realm`         | protocol realm (from [`ClientConfig`])             |
//! | `scheme`        | signature scheme (from [`ClientConfig`])           |
//! | `key-id`        | id of the signing key                              |
//! | `signature`     | hex signature over the authentication payload      |
//! | `created-at-ms` | signing time, part of the signed payload           |
//! | `member-id`     | caller's member id, or                             |
//! | `username`      | pending username before a member id is assigned    |
//! | `on-behalf-of`  | only when the call context carries a delegation    |
//!
//! The authentication payload is the canonical JSON of
//! `{"created_at_ms": .., "request": "<hex of the request bytes>"}`.
//! Nothing is cached between calls.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;

use super::context::AuthenticationContext;
use crate::canonical::to_canonical_bytes;
use crate::config::ClientConfig;
use crate::security::{now_ms, CryptoEngine, KeyLevel, Signer, Verifier};
use crate::{MemberId, Result, TokenkitError};

/// String metadata attached to a call.
pub type CallMetadata = BTreeMap<String, String>;

pub const REALM_HEADER: &str = "realm";
pub const SCHEME_HEADER: &str = "scheme";
pub const KEY_ID_HEADER: &str = "key-id";
pub const SIGNATURE_HEADER: &str = "signature";
pub const CREATED_AT_HEADER: &str = "created-at-ms";
pub const MEMBER_ID_HEADER: &str = "member-id";
pub const USERNAME_HEADER: &str = "username";
pub const ON_BEHALF_OF_HEADER: &str = "on-behalf-of";

/// Who is making the call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CallerIdentity {
    /// A registered member.
    Member(MemberId),
    /// A pending registration that has no member id yet.
    Username(String),
}

#[derive(Serialize)]
struct AuthenticationPayload {
    request: String,
    created_at_ms: u64,
}

/// Bytes that the envelope signature covers.
pub fn authentication_payload_bytes(request_bytes: &[u8], created_at_ms: u64) -> Result<Vec<u8>> {
    to_canonical_bytes(&AuthenticationPayload {
        request: hex::encode(request_bytes),
        created_at_ms,
    })
}

/// Computes the authentication envelope for outgoing calls.
#[derive(Clone)]
pub struct RequestAuthenticator {
    realm: String,
    scheme: String,
    identity: CallerIdentity,
    engine: Arc<dyn CryptoEngine>,
    level: KeyLevel,
}

impl RequestAuthenticator {
    pub fn new(config: &ClientConfig, identity: CallerIdentity, engine: Arc<dyn CryptoEngine>) -> Self {
        Self {
            realm: config.realm.clone(),
            scheme: config.scheme.clone(),
            identity,
            engine,
            level: config.auth_key_level,
        }
    }

    pub fn identity(&self) -> &CallerIdentity {
        &self.identity
    }

    pub fn engine(&self) -> &Arc<dyn CryptoEngine> {
        &self.engine
    }

    /// Sign `request_bytes` with a signer at the configured level.
    ///
    /// Consumes any delegation held by `ctx`.
    pub fn authenticate(
        &self,
        request_bytes: &[u8],
        ctx: &mut AuthenticationContext,
    ) -> Result<CallMetadata> {
        // Read-and-clear before anything can fail, so a failed call never
        // leaves a delegation behind for the next one.
        let on_behalf_of = ctx.take_on_behalf_of();
        let signer = self.engine.signer_for_level(self.level)?;
        self.sign_envelope(signer.as_ref(), request_bytes, now_ms(), on_behalf_of)
    }

    /// Sign `request_bytes` with an explicit signer and timestamp.
    pub fn authenticate_with(
        &self,
        signer: &dyn Signer,
        request_bytes: &[u8],
        created_at_ms: u64,
        ctx: &mut AuthenticationContext,
    ) -> Result<CallMetadata> {
        let on_behalf_of = ctx.take_on_behalf_of();
        self.sign_envelope(signer, request_bytes, created_at_ms, on_behalf_of)
    }

    fn sign_envelope(
        &self,
        signer: &dyn Signer,
        request_bytes: &[u8],
        created_at_ms: u64,
        on_behalf_of: Option<String>,
    ) -> Result<CallMetadata> {
        let payload = authentication_payload_bytes(request_bytes, created_at_ms)?;
        let signature = signer.sign(&payload)?;

        let mut metadata = CallMetadata::new();
        metadata.insert(REALM_HEADER.into(), self.realm.clone());
        metadata.insert(SCHEME_HEADER.into(), self.scheme.clone());
        metadata.insert(KEY_ID_HEADER.into(), signer.key_id().to_string());
        metadata.insert(SIGNATURE_HEADER.into(), hex::encode(signature));
        metadata.insert(CREATED_AT_HEADER.into(), created_at_ms.to_string());
        match &self.identity {
            CallerIdentity::Member(id) => {
                metadata.insert(MEMBER_ID_HEADER.into(), id.to_string());
            }
            CallerIdentity::Username(name) => {
                metadata.insert(USERNAME_HEADER.into(), name.clone());
            }
        }
        if let Some(token_id) = on_behalf_of {
            metadata.insert(ON_BEHALF_OF_HEADER.into(), token_id);
        }

        #[cfg(feature = "tracing")]
        tracing::trace!(key_id = signer.key_id(), created_at_ms, "signed request envelope");
        Ok(metadata)
    }
}

impl std::fmt::Debug for RequestAuthenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestAuthenticator")
            .field("realm", &self.realm)
            .field("scheme", &self.scheme)
            .field("identity", &self.identity)
            .field("level", &self.level)
            .finish_non_exhaustive()
    }
}

/// A parsed authentication envelope, as seen by the receiving side.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Envelope {
    pub realm: String,
    pub scheme: String,
    pub key_id: String,
    pub signature: Vec<u8>,
    pub created_at_ms: u64,
    pub identity: CallerIdentity,
    pub on_behalf_of: Option<String>,
}

fn header<'a>(metadata: &'a CallMetadata, name: &str) -> Result<&'a str> {
    metadata
        .get(name)
        .map(String::as_str)
        .ok_or_else(|| TokenkitError::invalid_data(name, "missing header"))
}

impl Envelope {
    /// Parse the envelope headers out of call metadata.
    pub fn parse(metadata: &CallMetadata) -> Result<Self> {
        let signature = hex::decode(header(metadata, SIGNATURE_HEADER)?)
            .map_err(|e| TokenkitError::invalid_data(SIGNATURE_HEADER, e.to_string()))?;
        let created_at_ms = header(metadata, CREATED_AT_HEADER)?
            .parse::<u64>()
            .map_err(|e| TokenkitError::invalid_data(CREATED_AT_HEADER, e.to_string()))?;

        let identity = match (metadata.get(MEMBER_ID_HEADER), metadata.get(USERNAME_HEADER)) {
            (Some(id), None) => CallerIdentity::Member(MemberId::new(id.clone())),
            (None, Some(name)) => CallerIdentity::Username(name.clone()),
            _ => {
                return Err(TokenkitError::invalid_data(
                    "identity",
                    "exactly one of member-id or username is required",
                ))
            }
        };

        Ok(Self {
            realm: header(metadata, REALM_HEADER)?.to_string(),
            scheme: header(metadata, SCHEME_HEADER)?.to_string(),
            key_id: header(metadata, KEY_ID_HEADER)?.to_string(),
            signature,
            created_at_ms,
            identity,
            on_behalf_of: metadata.get(ON_BEHALF_OF_HEADER).cloned(),
        })
    }

    /// Verify the envelope signature over `request_bytes`.
    pub fn verify(&self, request_bytes: &[u8], verifier: &dyn Verifier) -> Result<()> {
        if verifier.key_id() != self.key_id {
            return Err(TokenkitError::Crypto(format!(
                "envelope names key {} but verifier holds {}",
                self.key_id,
                verifier.key_id()
            )));
        }
        let payload = authentication_payload_bytes(request_bytes, self.created_at_ms)?;
        verifier.verify(&payload, &self.signature)
    }

    /// Whether the signing time lies within `window_ms` of `now_ms`.
    pub fn is_fresh(&self, now_ms: u64, window_ms: u64) -> bool {
        self.created_at_ms.abs_diff(now_ms) <= window_ms
    }
}

/// Parse, check freshness of, and verify the envelope in `metadata`.
///
/// `verifier` must belong to the key named by the envelope; callers look it
/// up from [`Envelope::key_id`] after a first [`Envelope::parse`].
pub fn verify_envelope(
    metadata: &CallMetadata,
    request_bytes: &[u8],
    verifier: &dyn Verifier,
    now_ms: u64,
    freshness_window_ms: u64,
) -> Result<Envelope> {
    let envelope = Envelope::parse(metadata)?;
    if !envelope.is_fresh(now_ms, freshness_window_ms) {
        return Err(TokenkitError::Crypto(format!(
            "signature created at {} is outside the {}ms window",
            envelope.created_at_ms, freshness_window_ms
        )));
    }
    envelope.verify(request_bytes, verifier)?;
    Ok(envelope)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::InMemoryCryptoEngine;

    fn authenticator(identity: CallerIdentity) -> (RequestAuthenticator, Arc<InMemoryCryptoEngine>) {
        let engine = Arc::new(InMemoryCryptoEngine::new());
        engine.generate_key(KeyLevel::Low).unwrap();
        engine.generate_key(KeyLevel::Privileged).unwrap();
        let auth = RequestAuthenticator::new(&ClientConfig::default(), identity, engine.clone());
        (auth, engine)
    }

    #[test]
    fn envelope_carries_all_headers_and_verifies() {
        let (auth, engine) = authenticator(CallerIdentity::Member(MemberId::new("m:alice")));
        let mut ctx = AuthenticationContext::new();
        let metadata = auth.authenticate(b"{\"ping\":1}", &mut ctx).unwrap();

        assert_eq!(metadata[REALM_HEADER], ClientConfig::default().realm);
        assert_eq!(metadata[MEMBER_ID_HEADER], "m:alice");
        assert!(!metadata.contains_key(USERNAME_HEADER));
        assert!(!metadata.contains_key(ON_BEHALF_OF_HEADER));

        let envelope = Envelope::parse(&metadata).unwrap();
        let low_key = engine.signer_for_level(KeyLevel::Low).unwrap();
        assert_eq!(envelope.key_id, low_key.key_id());

        let verifier = engine.verifier_for_key(&envelope.key_id).unwrap();
        envelope.verify(b"{\"ping\":1}", verifier.as_ref()).unwrap();
        assert!(envelope.verify(b"{\"ping\":2}", verifier.as_ref()).is_err());
    }

    #[test]
    fn delegation_is_read_and_cleared() {
        let (auth, _) = authenticator(CallerIdentity::Member(MemberId::new("m:bob")));
        let mut ctx = AuthenticationContext::with_on_behalf_of("tt:access-1");

        let first = auth.authenticate(b"a", &mut ctx).unwrap();
        assert_eq!(first[ON_BEHALF_OF_HEADER], "tt:access-1");
        assert_eq!(ctx.peek(), None);

        let second = auth.authenticate(b"b", &mut ctx).unwrap();
        assert!(!second.contains_key(ON_BEHALF_OF_HEADER));
    }

    #[test]
    fn delegation_is_cleared_even_when_signing_fails() {
        let engine = Arc::new(InMemoryCryptoEngine::new());
        let auth = RequestAuthenticator::new(
            &ClientConfig::default(),
            CallerIdentity::Member(MemberId::new("m:carol")),
            engine,
        );
        let mut ctx = AuthenticationContext::with_on_behalf_of("tt:x");
        let signer_missing = auth.authenticate(b"a", &mut ctx);
        assert!(matches!(signer_missing, Err(TokenkitError::KeyUnavailable(_))));
        assert_eq!(ctx.peek(), None);
    }

    #[test]
    fn username_identity_for_pre_registration() {
        let (auth, _) = authenticator(CallerIdentity::Username("alice".into()));
        let metadata = auth.authenticate(b"x", &mut AuthenticationContext::new()).unwrap();
        assert_eq!(metadata[USERNAME_HEADER], "alice");
        assert!(!metadata.contains_key(MEMBER_ID_HEADER));
        assert_eq!(
            Envelope::parse(&metadata).unwrap().identity,
            CallerIdentity::Username("alice".into())
        );
    }

    #[test]
    fn every_call_is_freshly_signed() {
        let (auth, engine) = authenticator(CallerIdentity::Member(MemberId::new("m:d")));
        let signer = engine.signer_for_level(KeyLevel::Low).unwrap();
        let mut ctx = AuthenticationContext::new();
        let a = auth.authenticate_with(signer.as_ref(), b"same", 1_000, &mut ctx).unwrap();
        let b = auth.authenticate_with(signer.as_ref(), b"same", 1_001, &mut ctx).unwrap();
        assert_ne!(a[SIGNATURE_HEADER], b[SIGNATURE_HEADER]);
    }

    #[test]
    fn freshness_window() {
        let (auth, engine) = authenticator(CallerIdentity::Member(MemberId::new("m:e")));
        let signer = engine.signer_for_level(KeyLevel::Low).unwrap();
        let metadata = auth
            .authenticate_with(signer.as_ref(), b"x", 10_000, &mut AuthenticationContext::new())
            .unwrap();
        let envelope = Envelope::parse(&metadata).unwrap();
        assert!(envelope.is_fresh(12_000, 5_000));
        assert!(!envelope.is_fresh(20_000, 5_000));

        let verifier = engine.verifier_for_key(&envelope.key_id).unwrap();
        verify_envelope(&metadata, b"x", verifier.as_ref(), 12_000, 5_000).unwrap();
        assert!(verify_envelope(&metadata, b"x", verifier.as_ref(), 20_000, 5_000).is_err());
    }

    #[test]
    fn both_identities_is_malformed() {
        let (auth, _) = authenticator(CallerIdentity::Member(MemberId::new("m:f")));
        let mut metadata = auth.authenticate(b"x", &mut AuthenticationContext::new()).unwrap();
        metadata.insert(USERNAME_HEADER.into(), "f".into());
        assert!(Envelope::parse(&metadata).is_err());
    }
}
