//! Error types for tokenkit operations.
//!
//! Every failure coming back from the platform is classified exactly once, at
//! the transport seam (see [`TokenkitError::from_failure`]). The underlying
//! [`TransportFailure`] is preserved inside every classified variant so callers
//! can inspect whatever structured detail the platform attached.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::security::KeyLevel;

/// Error codes for FFI and mobile integration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum TokenkitErrorCode {
    /// Transport/network layer error
    Transport = 2000,
    /// Caller-level timeout elapsed
    ConnectionTimeout = 2002,
    /// No signer at the requested level
    KeyUnavailable = 3000,
    /// Platform rejected the request signature
    SignatureRejected = 3001,
    /// Member update built against an outdated hash
    StaleBase = 4000,
    /// Token needs more endorsements
    PolicyUnsatisfied = 4001,
    /// Token operation reported failure
    TokenOperationFailed = 4002,
    /// Invalid request/data
    InvalidData = 5000,
    /// Serialization error
    Serialization = 5002,
    /// Cryptographic failure
    Crypto = 6000,
    /// Internal/unexpected error
    Internal = 9999,
}

/// Status codes a transport may report for a failed call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusCode {
    InvalidArgument,
    NotFound,
    AlreadyExists,
    PermissionDenied,
    Unauthenticated,
    FailedPrecondition,
    Aborted,
    DeadlineExceeded,
    Unavailable,
    Internal,
    Unknown,
}

impl std::fmt::Display for StatusCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::NotFound => "NOT_FOUND",
            Self::AlreadyExists => "ALREADY_EXISTS",
            Self::PermissionDenied => "PERMISSION_DENIED",
            Self::Unauthenticated => "UNAUTHENTICATED",
            Self::FailedPrecondition => "FAILED_PRECONDITION",
            Self::Aborted => "ABORTED",
            Self::DeadlineExceeded => "DEADLINE_EXCEEDED",
            Self::Unavailable => "UNAVAILABLE",
            Self::Internal => "INTERNAL",
            Self::Unknown => "UNKNOWN",
        };
        f.write_str(s)
    }
}

/// Structured error payload the platform may attach to a failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PlatformError {
    /// The update's `prev_hash` did not match the member's current hash.
    StaleBase {
        member_id: String,
        expected_hash: String,
        actual_hash: String,
    },
    /// A request envelope, update or token signature failed verification,
    /// or the envelope was outside the freshness window.
    SignatureRejected { reason: String },
    /// The token is already cancelled or replaced.
    TerminalToken { token_id: String, state: String },
    /// Any other platform-side rule violation.
    Rejected { reason: String },
}

/// A failure reported by the transport collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportFailure {
    pub status: StatusCode,
    pub description: Option<String>,
    pub error: Option<PlatformError>,
}

impl TransportFailure {
    /// Create a failure with just a status code.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            description: None,
            error: None,
        }
    }

    /// Attach a human-readable description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Attach a structured platform error.
    pub fn with_error(mut self, error: PlatformError) -> Self {
        self.error = Some(error);
        self
    }

    /// Shorthand for an `UNAVAILABLE` failure, the usual network-level outcome.
    pub fn unavailable(description: impl Into<String>) -> Self {
        Self::new(StatusCode::Unavailable).with_description(description)
    }
}

impl std::fmt::Display for TransportFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.description {
            Some(desc) => write!(f, "{}: {}", self.status, desc),
            None => write!(f, "{}", self.status),
        }
    }
}

/// Comprehensive error type for tokenkit operations.
#[derive(Debug, Error)]
pub enum TokenkitError {
    /// No usable signer exists at (or above) the requested level.
    #[error("no signing key available: {0}")]
    KeyUnavailable(String),

    /// The member's hash moved on since the update was built.
    #[error("stale base for member {member_id}: update built on {prev_hash}")]
    StaleBase {
        member_id: String,
        prev_hash: String,
        failure: TransportFailure,
    },

    /// The platform refused the request signature or its timestamp.
    #[error("signature rejected: {0}")]
    SignatureRejected(TransportFailure),

    /// The token still needs endorsements before it is usable.
    #[error("token {token_id} needs more signatures")]
    PolicyUnsatisfied { token_id: String },

    /// The platform reported a failed token operation.
    #[error("token operation on {token_id} failed")]
    TokenOperationFailed { token_id: String },

    /// Any other transport or platform failure, unmodified.
    #[error("transport error: {0}")]
    Transport(TransportFailure),

    /// The caller-level timeout elapsed before a response arrived.
    #[error("{operation} timed out after {timeout_ms}ms")]
    ConnectionTimeout { operation: String, timeout_ms: u64 },

    /// Invalid data provided by the caller.
    #[error("invalid {field}: {reason}")]
    InvalidData { field: String, reason: String },

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("crypto error: {0}")]
    Crypto(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl TokenkitError {
    /// Get the error code for FFI/mobile integration.
    pub fn code(&self) -> TokenkitErrorCode {
        match self {
            Self::KeyUnavailable(_) => TokenkitErrorCode::KeyUnavailable,
            Self::StaleBase { .. } => TokenkitErrorCode::StaleBase,
            Self::SignatureRejected(_) => TokenkitErrorCode::SignatureRejected,
            Self::PolicyUnsatisfied { .. } => TokenkitErrorCode::PolicyUnsatisfied,
            Self::TokenOperationFailed { .. } => TokenkitErrorCode::TokenOperationFailed,
            Self::Transport(_) => TokenkitErrorCode::Transport,
            Self::ConnectionTimeout { .. } => TokenkitErrorCode::ConnectionTimeout,
            Self::InvalidData { .. } => TokenkitErrorCode::InvalidData,
            Self::Serialization(_) => TokenkitErrorCode::Serialization,
            Self::Crypto(_) => TokenkitErrorCode::Crypto,
            Self::Internal(_) => TokenkitErrorCode::Internal,
        }
    }

    /// Returns true if the caller may reasonably try the same call again.
    ///
    /// A stale base is retryable only after the caller refetches and rebuilds
    /// the update; this crate never does that on its own.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::StaleBase { .. } | Self::ConnectionTimeout { .. } => true,
            Self::Transport(failure) => matches!(
                failure.status,
                StatusCode::Unavailable | StatusCode::DeadlineExceeded
            ),
            _ => false,
        }
    }

    /// The transport failure behind this error, if it came from the platform.
    pub fn transport_failure(&self) -> Option<&TransportFailure> {
        match self {
            Self::StaleBase { failure, .. } => Some(failure),
            Self::SignatureRejected(failure) | Self::Transport(failure) => Some(failure),
            _ => None,
        }
    }

    /// Classify a transport failure, keeping the failure itself intact.
    pub fn from_failure(failure: TransportFailure) -> Self {
        match &failure.error {
            Some(PlatformError::StaleBase {
                member_id,
                expected_hash,
                ..
            }) => Self::StaleBase {
                member_id: member_id.clone(),
                prev_hash: expected_hash.clone(),
                failure,
            },
            Some(PlatformError::SignatureRejected { .. }) => Self::SignatureRejected(failure),
            _ if failure.status == StatusCode::Unauthenticated => Self::SignatureRejected(failure),
            _ => Self::Transport(failure),
        }
    }

    /// Create a key-unavailable error for a level request.
    pub fn no_key_at_level(level: KeyLevel) -> Self {
        Self::KeyUnavailable(format!("no unexpired key at level {level} or above"))
    }

    /// Create an invalid data error.
    pub fn invalid_data(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidData {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl From<TransportFailure> for TokenkitError {
    fn from(failure: TransportFailure) -> Self {
        Self::from_failure(failure)
    }
}

impl From<serde_json::Error> for TokenkitError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stale_base_payload_is_classified() {
        let failure = TransportFailure::new(StatusCode::Aborted).with_error(PlatformError::StaleBase {
            member_id: "m:1".into(),
            expected_hash: "h1".into(),
            actual_hash: "h2".into(),
        });
        let err = TokenkitError::from(failure.clone());
        assert_eq!(err.code(), TokenkitErrorCode::StaleBase);
        assert!(err.is_retryable());
        assert_eq!(err.transport_failure(), Some(&failure));
    }

    #[test]
    fn unauthenticated_status_is_signature_rejected() {
        let failure =
            TransportFailure::new(StatusCode::Unauthenticated).with_description("clock skew");
        let err = TokenkitError::from(failure);
        assert_eq!(err.code(), TokenkitErrorCode::SignatureRejected);
        assert!(!err.is_retryable());
    }

    #[test]
    fn other_failures_pass_through_unmodified() {
        let failure = TransportFailure::new(StatusCode::FailedPrecondition)
            .with_description("token already cancelled")
            .with_error(PlatformError::TerminalToken {
                token_id: "tt:1".into(),
                state: "cancelled".into(),
            });
        match TokenkitError::from(failure.clone()) {
            TokenkitError::Transport(inner) => assert_eq!(inner, failure),
            other => panic!("unexpected classification: {other:?}"),
        }
    }

    #[test]
    fn test_error_display() {
        let err = TokenkitError::invalid_data("currency", "must be three letters");
        assert_eq!(err.to_string(), "invalid currency: must be three letters");
        assert_eq!(err.code(), TokenkitErrorCode::InvalidData);
    }
}
