//! Token payloads: the signable unit of a token.
//!
//! Payloads are immutable values. [`TokenPayloadBuilder`] validates and
//! finalizes a payload in one step; signatures are only ever computed over a
//! finished payload.

use rand::RngCore;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::member::Alias;
use crate::security::now_ms;
use crate::{MemberId, Result, TokenkitError};

pub const PAYLOAD_VERSION: &str = "1.0";

/// One side of a token.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Party {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub member_id: Option<MemberId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<Alias>,
}

impl Party {
    pub fn member(member_id: MemberId) -> Self {
        Self {
            member_id: Some(member_id),
            alias: None,
        }
    }

    pub fn alias(alias: Alias) -> Self {
        Self {
            member_id: None,
            alias: Some(alias),
        }
    }

    fn is_empty(&self) -> bool {
        self.member_id.is_none() && self.alias.is_none()
    }
}

/// A transfer of funds from `from` to `to`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferBody {
    pub currency: String,
    /// Maximum amount redeemable over the token's life.
    pub lifetime_amount: Decimal,
    /// Maximum amount per redemption, if narrower than the lifetime amount.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
}

/// A resource an access token grants.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "resource", rename_all = "snake_case")]
pub enum AccessResource {
    AllAccounts,
    AllBalances,
    AllTransactions,
    Account { account_id: String },
    Balance { account_id: String },
    Transactions { account_id: String },
}

/// Delegated read access to the grantor's resources.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessBody {
    pub resources: Vec<AccessResource>,
}

/// A recurring transfer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StandingOrderBody {
    pub currency: String,
    pub amount: Decimal,
    /// Schedule, e.g. `"MNTH"` or `"WEEK"`.
    pub frequency: String,
    pub start_date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
}

/// What the token authorizes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TokenBody {
    Transfer(TransferBody),
    Access(AccessBody),
    StandingOrder(StandingOrderBody),
}

impl TokenBody {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Transfer(_) => "transfer",
            Self::Access(_) => "access",
            Self::StandingOrder(_) => "standing_order",
        }
    }
}

/// The signable content of a token.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPayload {
    pub version: String,
    pub ref_id: String,
    pub nonce: String,
    pub from: Party,
    pub to: Party,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub effective_at_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at_ms: Option<u64>,
    pub body: TokenBody,
}

impl TokenPayload {
    /// Member id of the grantor; always present on a built payload.
    pub fn from_member_id(&self) -> Option<&MemberId> {
        self.from.member_id.as_ref()
    }
}

/// Fluent builder producing a validated [`TokenPayload`].
#[derive(Clone, Debug)]
pub struct TokenPayloadBuilder {
    from: Party,
    to: Option<Party>,
    body: TokenBody,
    ref_id: Option<String>,
    nonce: Option<String>,
    description: Option<String>,
    effective_at_ms: Option<u64>,
    expires_at_ms: Option<u64>,
}

impl TokenPayloadBuilder {
    fn with_body(from: MemberId, body: TokenBody) -> Self {
        Self {
            from: Party::member(from),
            to: None,
            body,
            ref_id: None,
            nonce: None,
            description: None,
            effective_at_ms: None,
            expires_at_ms: None,
        }
    }

    /// A transfer of up to `lifetime_amount` in `currency`.
    pub fn transfer(from: MemberId, currency: impl Into<String>, lifetime_amount: Decimal) -> Self {
        Self::with_body(
            from,
            TokenBody::Transfer(TransferBody {
                currency: currency.into(),
                lifetime_amount,
                amount: None,
                destination: None,
            }),
        )
    }

    /// An access grant over `resources`.
    pub fn access(from: MemberId, resources: Vec<AccessResource>) -> Self {
        Self::with_body(from, TokenBody::Access(AccessBody { resources }))
    }

    /// A standing order of `amount` in `currency` every `frequency`.
    pub fn standing_order(
        from: MemberId,
        currency: impl Into<String>,
        amount: Decimal,
        frequency: impl Into<String>,
        start_date: impl Into<String>,
    ) -> Self {
        Self::with_body(
            from,
            TokenBody::StandingOrder(StandingOrderBody {
                currency: currency.into(),
                amount,
                frequency: frequency.into(),
                start_date: start_date.into(),
                end_date: None,
            }),
        )
    }

    pub fn to(mut self, party: Party) -> Self {
        self.to = Some(party);
        self
    }

    pub fn to_member(self, member_id: MemberId) -> Self {
        self.to(Party::member(member_id))
    }

    pub fn to_alias(self, alias: Alias) -> Self {
        self.to(Party::alias(alias))
    }

    pub fn ref_id(mut self, ref_id: impl Into<String>) -> Self {
        self.ref_id = Some(ref_id.into());
        self
    }

    pub fn nonce(mut self, nonce: impl Into<String>) -> Self {
        self.nonce = Some(nonce.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn effective_at_ms(mut self, at: u64) -> Self {
        self.effective_at_ms = Some(at);
        self
    }

    pub fn expires_at_ms(mut self, at: u64) -> Self {
        self.expires_at_ms = Some(at);
        self
    }

    /// Per-redemption cap for transfer tokens. Ignored for other bodies.
    pub fn amount(mut self, amount: Decimal) -> Self {
        if let TokenBody::Transfer(body) = &mut self.body {
            body.amount = Some(amount);
        }
        self
    }

    /// Destination account for transfer tokens. Ignored for other bodies.
    pub fn destination(mut self, destination: impl Into<String>) -> Self {
        if let TokenBody::Transfer(body) = &mut self.body {
            body.destination = Some(destination.into());
        }
        self
    }

    /// End date for standing orders. Ignored for other bodies.
    pub fn end_date(mut self, end_date: impl Into<String>) -> Self {
        if let TokenBody::StandingOrder(body) = &mut self.body {
            body.end_date = Some(end_date.into());
        }
        self
    }

    /// Validate and finalize the payload.
    pub fn build(self) -> Result<TokenPayload> {
        let to = self
            .to
            .ok_or_else(|| TokenkitError::invalid_data("to", "recipient is required"))?;
        if to.is_empty() {
            return Err(TokenkitError::invalid_data("to", "needs a member id or alias"));
        }
        validate_body(&self.body)?;

        let effective_at_ms = self.effective_at_ms.unwrap_or_else(now_ms);
        if let Some(expires) = self.expires_at_ms {
            if expires <= effective_at_ms {
                return Err(TokenkitError::invalid_data(
                    "expires_at_ms",
                    "must be after effective_at_ms",
                ));
            }
        }

        Ok(TokenPayload {
            version: PAYLOAD_VERSION.to_string(),
            ref_id: self
                .ref_id
                .unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string()),
            nonce: self.nonce.unwrap_or_else(random_nonce),
            from: self.from,
            to,
            description: self.description,
            effective_at_ms,
            expires_at_ms: self.expires_at_ms,
            body: self.body,
        })
    }
}

fn random_nonce() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn validate_currency(currency: &str) -> Result<()> {
    if currency.len() == 3 && currency.chars().all(|c| c.is_ascii_uppercase()) {
        Ok(())
    } else {
        Err(TokenkitError::invalid_data(
            "currency",
            format!("'{currency}' is not a three-letter ISO code"),
        ))
    }
}

fn validate_positive(field: &str, amount: Decimal) -> Result<()> {
    if amount > Decimal::ZERO {
        Ok(())
    } else {
        Err(TokenkitError::invalid_data(field, "must be positive"))
    }
}

fn validate_body(body: &TokenBody) -> Result<()> {
    match body {
        TokenBody::Transfer(transfer) => {
            validate_currency(&transfer.currency)?;
            validate_positive("lifetime_amount", transfer.lifetime_amount)?;
            if let Some(amount) = transfer.amount {
                validate_positive("amount", amount)?;
                if amount > transfer.lifetime_amount {
                    return Err(TokenkitError::invalid_data(
                        "amount",
                        "exceeds lifetime_amount",
                    ));
                }
            }
            Ok(())
        }
        TokenBody::Access(access) => {
            if access.resources.is_empty() {
                return Err(TokenkitError::invalid_data("resources", "at least one is required"));
            }
            Ok(())
        }
        TokenBody::StandingOrder(order) => {
            validate_currency(&order.currency)?;
            validate_positive("amount", order.amount)?;
            if order.frequency.trim().is_empty() {
                return Err(TokenkitError::invalid_data("frequency", "is required"));
            }
            Ok(())
        }
    }
}
