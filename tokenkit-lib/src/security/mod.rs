//! Keys, privilege levels and the crypto engine seam.
//!
//! The protocol never touches secret material directly: it asks a
//! [`CryptoEngine`] for a [`Signer`] at a privilege level (or for a specific
//! key) and signs canonical bytes with it.

mod engine;
mod key;
mod memory;
mod signer;

pub use engine::{select_key_for_level, CryptoEngine};
pub use key::{key_id_for, now_ms, Key, KeyAlgorithm, KeyLevel};
pub use memory::InMemoryCryptoEngine;
pub use signer::{Ed25519Signer, Ed25519Verifier, Signer, Verifier};
