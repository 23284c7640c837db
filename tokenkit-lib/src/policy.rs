//! Key-level requirements for token actions.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::security::KeyLevel;
use crate::token::{TokenAction, TokenBody, TokenPayload, TokenSignature};

/// Level needed to cancel any token.
pub const CANCEL_LEVEL: KeyLevel = KeyLevel::Low;

/// Minimum level of an endorsement bundled into a replace request.
pub const REPLACE_ENDORSE_LEVEL: KeyLevel = KeyLevel::Standard;

fn default_low_level_transfer_limit() -> Decimal {
    Decimal::ONE_HUNDRED
}

/// Which key level each token action needs.
///
/// A token is authorized once its `from` member has an endorsement from a key
/// whose level satisfies [`AuthorizationPolicy::required_endorse_level`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationPolicy {
    /// Largest transfer lifetime amount a LOW key may endorse.
    #[serde(default = "default_low_level_transfer_limit")]
    pub low_level_transfer_limit: Decimal,
}

impl Default for AuthorizationPolicy {
    fn default() -> Self {
        Self {
            low_level_transfer_limit: default_low_level_transfer_limit(),
        }
    }
}

impl AuthorizationPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_low_level_transfer_limit(mut self, limit: Decimal) -> Self {
        self.low_level_transfer_limit = limit;
        self
    }

    /// Minimum endorsement level for a token with `body`.
    pub fn required_endorse_level(&self, body: &TokenBody) -> KeyLevel {
        match body {
            TokenBody::Transfer(transfer) if transfer.lifetime_amount <= self.low_level_transfer_limit => {
                KeyLevel::Low
            }
            TokenBody::Transfer(_) => KeyLevel::Standard,
            TokenBody::Access(_) | TokenBody::StandingOrder(_) => KeyLevel::Standard,
        }
    }

    /// Minimum level of the endorsement bundled with a replacement.
    pub fn required_replace_endorse_level(&self, body: &TokenBody) -> KeyLevel {
        self.required_endorse_level(body).max(REPLACE_ENDORSE_LEVEL)
    }

    /// Whether `signatures` authorize `payload`.
    ///
    /// `level_of` resolves a key id of the grantor to its level; unknown keys
    /// count for nothing.
    pub fn is_authorized<F>(
        &self,
        payload: &TokenPayload,
        signatures: &[TokenSignature],
        level_of: F,
    ) -> bool
    where
        F: Fn(&str) -> Option<KeyLevel>,
    {
        let Some(grantor) = payload.from_member_id() else {
            return false;
        };
        let required = self.required_endorse_level(&payload.body);
        signatures
            .iter()
            .filter(|s| s.action == TokenAction::Endorsed && &s.member_id == grantor)
            .filter_map(|s| level_of(&s.key_id))
            .any(|level| level.satisfies(required))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::{AccessResource, TokenPayloadBuilder};
    use crate::MemberId;
    use rust_decimal_macros::dec;

    fn transfer(amount: Decimal) -> TokenPayload {
        TokenPayloadBuilder::transfer(MemberId::new("m:a"), "USD", amount)
            .to_member(MemberId::new("m:b"))
            .build()
            .unwrap()
    }

    fn endorsement(member: &str, key: &str) -> TokenSignature {
        TokenSignature {
            member_id: MemberId::new(member),
            key_id: key.into(),
            signature: "00".into(),
            action: TokenAction::Endorsed,
        }
    }

    #[test]
    fn transfer_threshold_picks_level() {
        let policy = AuthorizationPolicy::default();
        assert_eq!(policy.required_endorse_level(&transfer(dec!(100)).body), KeyLevel::Low);
        assert_eq!(
            policy.required_endorse_level(&transfer(dec!(100.01)).body),
            KeyLevel::Standard
        );

        let strict = AuthorizationPolicy::new().with_low_level_transfer_limit(dec!(1));
        assert_eq!(strict.required_endorse_level(&transfer(dec!(2)).body), KeyLevel::Standard);
    }

    #[test]
    fn replace_endorsement_is_at_least_standard() {
        let policy = AuthorizationPolicy::default();
        assert_eq!(
            policy.required_replace_endorse_level(&transfer(dec!(1)).body),
            KeyLevel::Standard
        );
    }

    #[test]
    fn authorization_needs_grantor_endorsement_at_level() {
        let policy = AuthorizationPolicy::default();
        let payload = TokenPayloadBuilder::access(MemberId::new("m:a"), vec![AccessResource::AllBalances])
            .to_member(MemberId::new("m:b"))
            .build()
            .unwrap();
        let level_of = |key: &str| match key {
            "low" => Some(KeyLevel::Low),
            "std" => Some(KeyLevel::Standard),
            _ => None,
        };

        assert!(!policy.is_authorized(&payload, &[], level_of));
        assert!(!policy.is_authorized(&payload, &[endorsement("m:a", "low")], level_of));
        assert!(!policy.is_authorized(&payload, &[endorsement("m:b", "std")], level_of));
        assert!(!policy.is_authorized(&payload, &[endorsement("m:a", "unknown")], level_of));
        assert!(policy.is_authorized(&payload, &[endorsement("m:a", "std")], level_of));
    }

    #[test]
    fn policy_deserializes_with_defaults() {
        let policy: AuthorizationPolicy = serde_json::from_str("{}").unwrap();
        assert_eq!(policy, AuthorizationPolicy::default());
    }
}
