//! Storage trait definitions

use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::models::{AccountId, CachedEntity, Cursor, EntityKey, EntityKind, Tombstone};

/// Per-account record of the last fully applied event batch
///
/// `advance_cursor` must be atomic: a reader sees either the old or the new
/// cursor, never a torn value. Durable implementations must survive process
/// restarts.
pub trait CursorStore: Send + Sync {
    /// Get the stored cursor, or [`Cursor::start`] if none was recorded
    fn get_cursor(&self, account_id: &AccountId) -> Result<Cursor>;

    /// Record that everything up to `cursor` has been applied
    fn advance_cursor(&self, account_id: &AccountId, cursor: &Cursor) -> Result<()>;

    /// Forget the account's progress so the next sync starts over
    fn reset_cursor(&self, account_id: &AccountId) -> Result<()>;
}

/// Final state of every entity touched by one reconciled batch
///
/// Each key appears at most once, either as an upsert or as a tombstone.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    pub upserts: Vec<CachedEntity>,
    pub tombstones: Vec<Tombstone>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.upserts.is_empty() && self.tombstones.is_empty()
    }
}

/// The durable local cache of messages, conversations and labels
///
/// Every write method is transactional on its own. Implementations must
/// serialize writes touching the same account.
pub trait MailboxStore: Send + Sync {
    /// Get a live entity
    fn get_entity(&self, key: &EntityKey) -> Result<Option<CachedEntity>>;

    /// Get the tombstone left by a delete, if any
    fn get_tombstone(&self, key: &EntityKey) -> Result<Option<Tombstone>>;

    /// List live entities of one kind, ordered by id
    fn list_entities(&self, account_id: &AccountId, kind: EntityKind)
    -> Result<Vec<CachedEntity>>;

    /// Count live entities for an account
    fn count_entities(&self, account_id: &AccountId) -> Result<usize>;

    /// Insert or replace an entity, clearing any tombstone for its key
    fn upsert(&self, entity: CachedEntity) -> Result<()>;

    /// Remove an entity and remember the deletion at `seq`
    fn tombstone(&self, key: &EntityKey, seq: u64) -> Result<()>;

    /// Persist a whole change set in one transaction
    fn apply_changes(&self, changes: &ChangeSet) -> Result<()>;

    /// Delete every entity whose expiry is at or before `now_secs`
    ///
    /// Returns the number of entities removed.
    fn delete_expired(&self, now_secs: i64) -> Result<usize>;

    /// Drop tombstones recorded before `older_than`
    fn purge_tombstones(&self, older_than: DateTime<Utc>) -> Result<usize>;

    /// Remove all entities and tombstones of an account
    fn clear_account(&self, account_id: &AccountId) -> Result<()>;
}
