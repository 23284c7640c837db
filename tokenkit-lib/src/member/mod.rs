//! Member state and the hash-chained update protocol.
//!
//! 1. Build the operations (aliases are normalized and hashed first).
//! 2. Fetch the member's current `last_hash`.
//! 3. Build a [`MemberUpdate`] with `prev_hash = last_hash`.
//! 4. Sign it with a key at the level the operations require and send it.
//! 5. Replace the cached record with the one the platform returns.
//!
//! The platform accepts the update only if `prev_hash` still matches, and
//! applies all of its operations or none.

mod alias;
mod handle;
mod operation;
mod record;
mod update;

pub use alias::{Alias, AliasType};
pub use handle::Member;
pub use operation::{required_level_for, MemberOperation, RecoveryRule};
pub use record::MemberRecord;
pub use update::{MemberUpdate, UpdateSignature};
