//! Platform-owned member state as seen by the client.

use serde::{Deserialize, Serialize};

use super::alias::Alias;
use super::operation::RecoveryRule;
use crate::security::{Key, KeyLevel};
use crate::MemberId;

/// Snapshot of a member returned by the platform.
///
/// Read-only on the client; refreshed whenever the platform returns a newer one.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberRecord {
    pub id: MemberId,
    /// Hash over the member's operation log; empty before the genesis update.
    pub last_hash: String,
    #[serde(default)]
    pub keys: Vec<Key>,
    #[serde(default)]
    pub aliases: Vec<Alias>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recovery_rule: Option<RecoveryRule>,
}

impl MemberRecord {
    /// A member that exists but has not applied any update yet.
    pub fn empty(id: MemberId) -> Self {
        Self {
            id,
            last_hash: String::new(),
            keys: Vec::new(),
            aliases: Vec::new(),
            recovery_rule: None,
        }
    }

    pub fn key(&self, key_id: &str) -> Option<&Key> {
        self.keys.iter().find(|k| k.id == key_id)
    }

    /// Level of `key_id`, if the member holds it.
    pub fn key_level(&self, key_id: &str) -> Option<KeyLevel> {
        self.key(key_id).map(|k| k.level)
    }

    pub fn has_alias_hash(&self, alias_hash: &str) -> bool {
        self.aliases
            .iter()
            .any(|a| a.alias_hash().map(|h| h == alias_hash).unwrap_or(false))
    }
}
