//! In-memory storage implementation
//!
//! Used by tests and by hosts that only need a transient cache.

use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::{ChangeSet, CursorStore, MailboxStore};
use crate::models::{AccountId, CachedEntity, Cursor, EntityKey, EntityKind, Tombstone};

/// In-memory implementation of [`MailboxStore`] and [`CursorStore`]
///
/// Uses HashMaps protected by RwLocks. Multi-map writes always take the
/// `entities` lock before the `tombstones` lock.
pub struct InMemoryStore {
    cursors: RwLock<HashMap<AccountId, Cursor>>,
    entities: RwLock<HashMap<EntityKey, CachedEntity>>,
    tombstones: RwLock<HashMap<EntityKey, Tombstone>>,
}

fn read<T>(lock: &RwLock<T>) -> Result<RwLockReadGuard<'_, T>> {
    lock.read().map_err(|_| anyhow!("In-memory store lock poisoned"))
}

fn write<T>(lock: &RwLock<T>) -> Result<RwLockWriteGuard<'_, T>> {
    lock.write().map_err(|_| anyhow!("In-memory store lock poisoned"))
}

impl InMemoryStore {
    /// Create a new empty in-memory store
    pub fn new() -> Self {
        Self {
            cursors: RwLock::new(HashMap::new()),
            entities: RwLock::new(HashMap::new()),
            tombstones: RwLock::new(HashMap::new()),
        }
    }

    /// Number of tombstones currently held
    pub fn tombstone_count(&self) -> Result<usize> {
        Ok(read(&self.tombstones)?.len())
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CursorStore for InMemoryStore {
    fn get_cursor(&self, account_id: &AccountId) -> Result<Cursor> {
        let cursors = read(&self.cursors)?;
        Ok(cursors.get(account_id).cloned().unwrap_or_else(Cursor::start))
    }

    fn advance_cursor(&self, account_id: &AccountId, cursor: &Cursor) -> Result<()> {
        write(&self.cursors)?.insert(account_id.clone(), cursor.clone());
        Ok(())
    }

    fn reset_cursor(&self, account_id: &AccountId) -> Result<()> {
        write(&self.cursors)?.remove(account_id);
        Ok(())
    }
}

impl MailboxStore for InMemoryStore {
    fn get_entity(&self, key: &EntityKey) -> Result<Option<CachedEntity>> {
        Ok(read(&self.entities)?.get(key).cloned())
    }

    fn get_tombstone(&self, key: &EntityKey) -> Result<Option<Tombstone>> {
        Ok(read(&self.tombstones)?.get(key).cloned())
    }

    fn list_entities(
        &self,
        account_id: &AccountId,
        kind: EntityKind,
    ) -> Result<Vec<CachedEntity>> {
        let entities = read(&self.entities)?;
        let mut result: Vec<CachedEntity> = entities
            .values()
            .filter(|e| &e.key.account_id == account_id && e.key.kind == kind)
            .cloned()
            .collect();
        result.sort_by(|a, b| a.key.id.cmp(&b.key.id));
        Ok(result)
    }

    fn count_entities(&self, account_id: &AccountId) -> Result<usize> {
        let entities = read(&self.entities)?;
        Ok(entities
            .keys()
            .filter(|k| &k.account_id == account_id)
            .count())
    }

    fn upsert(&self, entity: CachedEntity) -> Result<()> {
        let mut entities = write(&self.entities)?;
        let mut tombstones = write(&self.tombstones)?;
        tombstones.remove(&entity.key);
        entities.insert(entity.key.clone(), entity);
        Ok(())
    }

    fn tombstone(&self, key: &EntityKey, seq: u64) -> Result<()> {
        let mut entities = write(&self.entities)?;
        let mut tombstones = write(&self.tombstones)?;
        entities.remove(key);
        tombstones.insert(key.clone(), Tombstone::new(key.clone(), seq));
        Ok(())
    }

    fn apply_changes(&self, changes: &ChangeSet) -> Result<()> {
        // Both locks are held for the whole set so readers never observe
        // half of it.
        let mut entities = write(&self.entities)?;
        let mut tombstones = write(&self.tombstones)?;

        for tombstone in &changes.tombstones {
            entities.remove(&tombstone.key);
            tombstones.insert(tombstone.key.clone(), tombstone.clone());
        }
        for entity in &changes.upserts {
            tombstones.remove(&entity.key);
            entities.insert(entity.key.clone(), entity.clone());
        }
        Ok(())
    }

    fn delete_expired(&self, now_secs: i64) -> Result<usize> {
        let mut entities = write(&self.entities)?;
        let before = entities.len();
        entities.retain(|_, e| !e.is_expired(now_secs));
        Ok(before - entities.len())
    }

    fn purge_tombstones(&self, older_than: DateTime<Utc>) -> Result<usize> {
        let mut tombstones = write(&self.tombstones)?;
        let before = tombstones.len();
        tombstones.retain(|_, t| t.deleted_at >= older_than);
        Ok(before - tombstones.len())
    }

    fn clear_account(&self, account_id: &AccountId) -> Result<()> {
        let mut entities = write(&self.entities)?;
        let mut tombstones = write(&self.tombstones)?;
        entities.retain(|k, _| &k.account_id != account_id);
        tombstones.retain(|k, _| &k.account_id != account_id);
        Ok(())
    }
}
