//! Tokens: payloads, canonical signatures, and lifecycle state.
//!
//! ```text
//! CREATED ──endorse──▶ ENDORSED
//!    │                    │
//!    ├──cancel──▶ CANCELLED (terminal)
//!    └──replace──▶ REPLACED (terminal) ──▶ new token CREATED/ENDORSED
//! ```
//!
//! A token's state is never stored; it is recomputed from the signatures the
//! platform has accepted.

mod lifecycle;
mod payload;
mod signature;

pub use lifecycle::{Token, TokenOperationResult, TokenOperationStatus, TokenState};
pub use payload::{
    AccessBody, AccessResource, Party, StandingOrderBody, TokenBody, TokenPayload,
    TokenPayloadBuilder, TransferBody, PAYLOAD_VERSION,
};
pub use signature::{canonical_signing_bytes, TokenAction, TokenSignature, ACTION_SEPARATOR};
