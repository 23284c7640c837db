//! Request authentication and per-call delegation.

mod authenticator;
mod context;

pub use authenticator::{
    authentication_payload_bytes, verify_envelope, CallMetadata, CallerIdentity, Envelope,
    RequestAuthenticator, CREATED_AT_HEADER, KEY_ID_HEADER, MEMBER_ID_HEADER, ON_BEHALF_OF_HEADER,
    REALM_HEADER, SCHEME_HEADER, SIGNATURE_HEADER, USERNAME_HEADER,
};
pub use context::AuthenticationContext;
