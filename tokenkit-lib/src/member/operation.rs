//! Member mutations.

use serde::{Deserialize, Serialize};

use super::alias::Alias;
use crate::security::{Key, KeyLevel};
use crate::Result;

/// Rule naming the agents allowed to recover a member's account.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryRule {
    pub primary_agent: String,
    #[serde(default)]
    pub secondary_agents: Vec<String>,
}

impl RecoveryRule {
    pub fn new(primary_agent: impl Into<String>) -> Self {
        Self {
            primary_agent: primary_agent.into(),
            secondary_agents: Vec::new(),
        }
    }

    pub fn with_secondary_agent(mut self, agent: impl Into<String>) -> Self {
        self.secondary_agents.push(agent.into());
        self
    }
}

/// A single change to a member's state.
///
/// Operations carry no signature of their own; the enclosing
/// [`super::MemberUpdate`] is signed as a whole.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum MemberOperation {
    AddKey { key: Key },
    RemoveKey { key_id: String },
    AddAlias { alias_hash: String, alias: Alias },
    RemoveAlias { alias_hash: String },
    SetRecoveryRule { rule: RecoveryRule },
}

impl MemberOperation {
    pub fn add_key(key: Key) -> Self {
        Self::AddKey { key }
    }

    pub fn remove_key(key_id: impl Into<String>) -> Self {
        Self::RemoveKey {
            key_id: key_id.into(),
        }
    }

    /// Normalize `alias` and compute its hash.
    pub fn add_alias(alias: &Alias) -> Result<Self> {
        let normalized = alias.normalize()?;
        Ok(Self::AddAlias {
            alias_hash: normalized.alias_hash()?,
            alias: normalized,
        })
    }

    pub fn remove_alias(alias: &Alias) -> Result<Self> {
        Ok(Self::RemoveAlias {
            alias_hash: alias.alias_hash()?,
        })
    }

    pub fn set_recovery_rule(rule: RecoveryRule) -> Self {
        Self::SetRecoveryRule { rule }
    }

    /// Minimum key level that may sign an update containing this operation.
    pub fn required_level(&self) -> KeyLevel {
        match self {
            Self::AddKey { .. } | Self::RemoveKey { .. } | Self::SetRecoveryRule { .. } => {
                KeyLevel::Privileged
            }
            Self::AddAlias { .. } | Self::RemoveAlias { .. } => KeyLevel::Privileged,
        }
    }

    /// Short name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::AddKey { .. } => "add_key",
            Self::RemoveKey { .. } => "remove_key",
            Self::AddAlias { .. } => "add_alias",
            Self::RemoveAlias { .. } => "remove_alias",
            Self::SetRecoveryRule { .. } => "set_recovery_rule",
        }
    }
}

/// Highest level required by any of `operations`; `Low` for an empty list.
pub fn required_level_for(operations: &[MemberOperation]) -> KeyLevel {
    operations
        .iter()
        .map(MemberOperation::required_level)
        .max()
        .unwrap_or(KeyLevel::Low)
}
