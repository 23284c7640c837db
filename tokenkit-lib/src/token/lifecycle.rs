//! Token state, derived from accumulated signatures.

use serde::{Deserialize, Serialize};

use super::payload::TokenPayload;
use super::signature::{TokenAction, TokenSignature};
use crate::policy::AuthorizationPolicy;
use crate::security::KeyLevel;
use crate::{Result, TokenkitError};

/// A token as stored by the platform.
///
/// There is no stored status; see [`Token::state`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub id: String,
    pub payload: TokenPayload,
    #[serde(default)]
    pub payload_signatures: Vec<TokenSignature>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replaced_by_token_id: Option<String>,
}

/// Lifecycle state inferred from a token's signatures.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TokenState {
    Created,
    Endorsed,
    Cancelled,
    Replaced,
}

impl TokenState {
    /// Cancelled and replaced tokens accept no further signatures.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Cancelled | Self::Replaced)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Endorsed => "endorsed",
            Self::Cancelled => "cancelled",
            Self::Replaced => "replaced",
        }
    }
}

impl Token {
    pub fn new(id: impl Into<String>, payload: TokenPayload) -> Self {
        Self {
            id: id.into(),
            payload,
            payload_signatures: Vec::new(),
            replaced_by_token_id: None,
        }
    }

    /// Signatures carrying `action`, in the order they were appended.
    pub fn signatures_with(&self, action: TokenAction) -> impl Iterator<Item = &TokenSignature> {
        self.payload_signatures.iter().filter(move |s| s.action == action)
    }

    pub fn is_cancelled(&self) -> bool {
        self.signatures_with(TokenAction::Cancelled).next().is_some()
    }

    /// Current state under `policy`.
    ///
    /// `level_of` maps a grantor key id to its level.
    pub fn state<F>(&self, policy: &AuthorizationPolicy, level_of: F) -> TokenState
    where
        F: Fn(&str) -> Option<KeyLevel>,
    {
        if self.replaced_by_token_id.is_some() {
            TokenState::Replaced
        } else if self.is_cancelled() {
            TokenState::Cancelled
        } else if policy.is_authorized(&self.payload, &self.payload_signatures, level_of) {
            TokenState::Endorsed
        } else {
            TokenState::Created
        }
    }

    /// Whether the token is terminal regardless of endorsement policy.
    pub fn is_terminal(&self) -> bool {
        self.replaced_by_token_id.is_some() || self.is_cancelled()
    }
}

/// Outcome reported by the platform for an endorse, cancel or replace.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TokenOperationStatus {
    Success,
    MoreSignaturesNeeded,
    Failure,
}

/// Token as it stands after an operation, plus the operation status.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenOperationResult {
    pub token: Token,
    pub status: TokenOperationStatus,
}

impl TokenOperationResult {
    pub fn new(token: Token, status: TokenOperationStatus) -> Self {
        Self { token, status }
    }

    pub fn is_success(&self) -> bool {
        self.status == TokenOperationStatus::Success
    }

    /// Return the token only if the operation fully succeeded.
    ///
    /// `MoreSignaturesNeeded` becomes `PolicyUnsatisfied`; `Failure` becomes
    /// `TokenOperationFailed`.
    pub fn require_success(self) -> Result<Token> {
        match self.status {
            TokenOperationStatus::Success => Ok(self.token),
            TokenOperationStatus::MoreSignaturesNeeded => Err(TokenkitError::PolicyUnsatisfied {
                token_id: self.token.id,
            }),
            TokenOperationStatus::Failure => Err(TokenkitError::TokenOperationFailed {
                token_id: self.token.id,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::TokenPayloadBuilder;
    use crate::MemberId;
    use rust_decimal_macros::dec;

    fn token() -> Token {
        let payload = TokenPayloadBuilder::transfer(MemberId::new("m:a"), "EUR", dec!(500))
            .to_member(MemberId::new("m:b"))
            .build()
            .unwrap();
        Token::new("tt:1", payload)
    }

    fn sig(key: &str, action: TokenAction) -> TokenSignature {
        TokenSignature {
            member_id: MemberId::new("m:a"),
            key_id: key.into(),
            signature: "00".into(),
            action,
        }
    }

    fn level_of(key: &str) -> Option<KeyLevel> {
        match key {
            "low" => Some(KeyLevel::Low),
            "std" => Some(KeyLevel::Standard),
            _ => None,
        }
    }

    #[test]
    fn state_follows_signatures() {
        let policy = AuthorizationPolicy::default();
        let mut t = token();
        assert_eq!(t.state(&policy, level_of), TokenState::Created);

        t.payload_signatures.push(sig("low", TokenAction::Endorsed));
        assert_eq!(t.state(&policy, level_of), TokenState::Created);

        t.payload_signatures.push(sig("std", TokenAction::Endorsed));
        assert_eq!(t.state(&policy, level_of), TokenState::Endorsed);
        assert!(!t.is_terminal());

        t.payload_signatures.push(sig("low", TokenAction::Cancelled));
        assert_eq!(t.state(&policy, level_of), TokenState::Cancelled);
        assert!(t.state(&policy, level_of).is_terminal());

        t.replaced_by_token_id = Some("tt:2".into());
        assert_eq!(t.state(&policy, level_of), TokenState::Replaced);
    }

    #[test]
    fn require_success_maps_statuses() {
        let ok = TokenOperationResult::new(token(), TokenOperationStatus::Success);
        assert_eq!(ok.require_success().unwrap().id, "tt:1");

        let pending = TokenOperationResult::new(token(), TokenOperationStatus::MoreSignaturesNeeded);
        assert!(matches!(
            pending.require_success(),
            Err(TokenkitError::PolicyUnsatisfied { .. })
        ));

        let failed = TokenOperationResult::new(token(), TokenOperationStatus::Failure);
        assert!(matches!(
            failed.require_success(),
            Err(TokenkitError::TokenOperationFailed { .. })
        ));
    }
}
