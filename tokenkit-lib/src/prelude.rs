//! Prelude module for convenient imports.
//!
//! ```rust,ignore
//! use tokenkit_lib::prelude::*;
//! ```

// Entry points
pub use crate::{Client, ClientConfig, Member, MemberId};

// Error handling
pub use crate::errors::{PlatformError, StatusCode, TokenkitError, TokenkitErrorCode, TransportFailure};
pub use crate::Result;

// Authentication
pub use crate::auth::{AuthenticationContext, CallMetadata};

// Keys
pub use crate::security::{CryptoEngine, InMemoryCryptoEngine, Key, KeyLevel, Signer, Verifier};

// Members
pub use crate::member::{Alias, AliasType, MemberOperation, MemberRecord, MemberUpdate, RecoveryRule};

// Tokens
pub use crate::policy::AuthorizationPolicy;
pub use crate::token::{
    AccessResource, Party, Token, TokenAction, TokenBody, TokenOperationResult,
    TokenOperationStatus, TokenPayload, TokenPayloadBuilder, TokenSignature, TokenState,
};

// Transport
pub use crate::rpc::{Request, Response};
pub use crate::Transport;
