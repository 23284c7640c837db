//! Member aliases and their normalized hashes.

use serde::{Deserialize, Serialize};

use crate::canonical::{sha256_hex, to_canonical_bytes};
use crate::{Result, TokenkitError};

/// Kind of human-friendly identifier an alias carries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AliasType {
    Email,
    Phone,
    Domain,
    Username,
    Custom,
}

/// A human-friendly identifier that resolves to a member.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Alias {
    #[serde(rename = "type")]
    pub alias_type: AliasType,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub realm: Option<String>,
}

impl Alias {
    pub fn new(alias_type: AliasType, value: impl Into<String>) -> Self {
        Self {
            alias_type,
            value: value.into(),
            realm: None,
        }
    }

    pub fn email(value: impl Into<String>) -> Self {
        Self::new(AliasType::Email, value)
    }

    pub fn phone(value: impl Into<String>) -> Self {
        Self::new(AliasType::Phone, value)
    }

    pub fn domain(value: impl Into<String>) -> Self {
        Self::new(AliasType::Domain, value)
    }

    /// Scope the alias to a realm.
    pub fn with_realm(mut self, realm: impl Into<String>) -> Self {
        self.realm = Some(realm.into());
        self
    }

    /// The normalized form that is hashed and stored.
    pub fn normalize(&self) -> Result<Alias> {
        let trimmed = self.value.trim();
        let value = match self.alias_type {
            AliasType::Email | AliasType::Domain | AliasType::Username => trimmed.to_lowercase(),
            AliasType::Phone => trimmed
                .chars()
                .filter(|c| !matches!(c, ' ' | '-' | '(' | ')' | '.'))
                .collect(),
            AliasType::Custom => trimmed.to_string(),
        };
        if value.is_empty() {
            return Err(TokenkitError::invalid_data("alias", "value is empty"));
        }
        if self.alias_type == AliasType::Email && !value.contains('@') {
            return Err(TokenkitError::invalid_data("alias", "email must contain '@'"));
        }
        Ok(Alias {
            alias_type: self.alias_type,
            value,
            realm: self.realm.as_ref().map(|r| r.trim().to_lowercase()),
        })
    }

    /// Hex SHA-256 of the canonical JSON of the normalized alias.
    pub fn alias_hash(&self) -> Result<String> {
        let normalized = self.normalize()?;
        Ok(sha256_hex(&to_canonical_bytes(&normalized)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn email_is_case_insensitive() {
        let a = Alias::email("  Alice@Example.COM ");
        let b = Alias::email("alice@example.com");
        assert_eq!(a.normalize().unwrap().value, "alice@example.com");
        assert_eq!(a.alias_hash().unwrap(), b.alias_hash().unwrap());
    }

    #[test]
    fn phone_punctuation_is_stripped() {
        let alias = Alias::phone("+1 (555) 010-9999");
        assert_eq!(alias.normalize().unwrap().value, "+15550109999");
    }

    #[test]
    fn types_do_not_collide() {
        let a = Alias::new(AliasType::Username, "alice");
        let b = Alias::new(AliasType::Custom, "alice");
        assert_ne!(a.alias_hash().unwrap(), b.alias_hash().unwrap());
    }

    #[test]
    fn invalid_aliases_are_rejected() {
        assert!(Alias::email("   ").normalize().is_err());
        assert!(Alias::email("not-an-email").normalize().is_err());
    }

    fn any_alias() -> impl Strategy<Value = Alias> {
        prop_oneof![
            "[ ]{0,3}[A-Za-z0-9.]{1,12}@[A-Za-z0-9.]{1,12}[ ]{0,3}".prop_map(Alias::email),
            "[ ]{0,2}[+0-9() .-]{1,20}".prop_map(Alias::phone),
            "[ ]{0,2}[A-Za-z0-9.-]{1,20}[ ]{0,2}".prop_map(Alias::domain),
            "[ ]{0,2}[A-Za-z0-9_]{1,16}".prop_map(|v| Alias::new(AliasType::Username, v)),
        ]
    }

    proptest! {
        #[test]
        fn normalizing_twice_changes_nothing(alias in any_alias()) {
            let Ok(once) = alias.normalize() else {
                return Ok(());
            };
            prop_assert_eq!(once.normalize().unwrap(), once.clone());
            prop_assert_eq!(once.alias_hash().unwrap(), alias.alias_hash().unwrap());
        }
    }
}
