//! Tokenkit library.
//!
//! Client-side signing for the Token member platform. Accounts, balances and
//! transfer execution live on the platform; this crate builds correctly
//! authenticated, causally ordered requests and drives the signature-bearing
//! state transitions:
//!
//! - **Request authentication**: every call carries a freshly signed envelope
//!   ([`auth`]).
//! - **Member updates**: hash-chained, all-or-nothing mutations of keys,
//!   aliases and recovery rules ([`member`]).
//! - **Token lifecycle**: create, endorse, cancel and replace with canonical
//!   payload signatures ([`token`], [`policy`]).
//!
//! The network and key storage are injected through the [`Transport`] and
//! [`CryptoEngine`] traits.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use tokenkit_lib::prelude::*;
//! use rust_decimal_macros::dec;
//!
//! let client = Client::new(transport, ClientConfig::default());
//! let alice = client
//!     .create_member(Arc::new(InMemoryCryptoEngine::new()), "alice")
//!     .await?;
//!
//! let payload = TokenPayloadBuilder::transfer(alice.id().clone(), "EUR", dec!(50))
//!     .to_alias(Alias::email("bob@example.com"))
//!     .build()?;
//! let token = alice.create_token(payload).await?;
//! let endorsed = alice.endorse_token(&token, KeyLevel::Standard).await?.require_success()?;
//! ```

pub mod auth;
pub mod canonical;
mod client;
pub mod config;
pub mod errors;
pub mod member;
pub mod policy;
pub mod prelude;
pub mod rpc;
pub mod security;
pub mod token;
mod transport;

pub use client::Client;
pub use config::ClientConfig;
pub use errors::{PlatformError, StatusCode, TokenkitError, TokenkitErrorCode, TransportFailure};
pub use member::Member;
pub use security::{CryptoEngine, InMemoryCryptoEngine, Key, KeyLevel};
pub use transport::{AuthenticatedClient, Transport};

/// Common result alias for tokenkit operations.
pub type Result<T> = std::result::Result<T, TokenkitError>;

/// Platform-assigned identifier of a member.
///
/// # Example
///
/// ```
/// use tokenkit_lib::MemberId;
///
/// let id: MemberId = "m:3xampl3".into();
/// assert_eq!(id.as_str(), "m:3xampl3");
/// assert_eq!(id.to_string(), "m:3xampl3");
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct MemberId(pub String);

impl MemberId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for MemberId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for MemberId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for MemberId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MemberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
