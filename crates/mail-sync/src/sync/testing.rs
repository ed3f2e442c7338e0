//! Fakes shared by the sync unit tests

use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use serde_json::json;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use crate::models::{AccountId, CachedEntity, Cursor, EntityKey, EntityKind, EventAction, Payload};
use crate::remote::{EventPage, EventSource, FetchError, RemoteEvent};
use crate::storage::{ChangeSet, MailboxStore};

pub fn remote_event(
    seq: u64,
    id: &str,
    action: EventAction,
    payload: serde_json::Value,
) -> RemoteEvent {
    RemoteEvent {
        seq,
        entity: EntityKind::Message,
        entity_id: id.to_string(),
        action,
        payload: payload.as_object().cloned().unwrap_or_default(),
    }
}

pub fn page(events: Vec<RemoteEvent>, next: &str, has_more: bool) -> EventPage {
    EventPage {
        events,
        next_cursor: Cursor::new(next),
        has_more,
        refresh: false,
    }
}

pub fn message_key(account: &str, id: &str) -> EntityKey {
    EntityKey::new(AccountId::new(account), EntityKind::Message, id)
}

pub fn fields(value: serde_json::Value) -> Payload {
    value.as_object().cloned().unwrap_or_default()
}

pub fn expiring_message(account: &str, id: &str, expires_at: i64) -> CachedEntity {
    CachedEntity::new(
        message_key(account, id),
        fields(json!({"subject": id, "expiration_time": expires_at})),
        1,
    )
}

/// Event source replaying scripted responses per account
///
/// Pages are served keyed by the cursor they were requested from, so a
/// replayed cursor gets the same answer twice.
#[derive(Default)]
pub struct ScriptedSource {
    pages: Mutex<HashMap<(AccountId, Cursor), Result<EventPage, FetchError>>>,
    queued: Mutex<HashMap<AccountId, VecDeque<Result<EventPage, FetchError>>>>,
    calls: Mutex<Vec<(AccountId, Cursor)>>,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer requests for `account` at `since` with `response`
    pub fn on(&self, account: &str, since: Cursor, response: Result<EventPage, FetchError>) {
        self.pages
            .lock()
            .unwrap()
            .insert((AccountId::new(account), since), response);
    }

    /// Answer the next request for `account` (any cursor) with `response`
    pub fn push(&self, account: &str, response: Result<EventPage, FetchError>) {
        self.queued
            .lock()
            .unwrap()
            .entry(AccountId::new(account))
            .or_default()
            .push_back(response);
    }

    pub fn calls_for(&self, account: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(a, _)| a.as_str() == account)
            .count()
    }
}

impl EventSource for ScriptedSource {
    fn fetch_events(
        &self,
        account_id: &AccountId,
        since: &Cursor,
    ) -> Result<EventPage, FetchError> {
        self.calls
            .lock()
            .unwrap()
            .push((account_id.clone(), since.clone()));

        if let Some(next) = self
            .queued
            .lock()
            .unwrap()
            .get_mut(account_id)
            .and_then(|q| q.pop_front())
        {
            return next;
        }

        self.pages
            .lock()
            .unwrap()
            .get(&(account_id.clone(), since.clone()))
            .cloned()
            .unwrap_or_else(|| Ok(page(Vec::new(), since.as_str(), false)))
    }
}

/// Mailbox wrapper whose writes fail for selected accounts
pub struct FailingMailbox {
    inner: Arc<dyn MailboxStore>,
    failing: Mutex<HashSet<AccountId>>,
    fail_cleanup: bool,
}

impl FailingMailbox {
    pub fn new(inner: Arc<dyn MailboxStore>) -> Self {
        Self {
            inner,
            failing: Mutex::new(HashSet::new()),
            fail_cleanup: false,
        }
    }

    pub fn failing_cleanup(mut self) -> Self {
        self.fail_cleanup = true;
        self
    }

    pub fn fail_writes_for(&self, account: &str) {
        self.failing.lock().unwrap().insert(AccountId::new(account));
    }

    fn check(&self, account_id: &AccountId) -> Result<()> {
        if self.failing.lock().unwrap().contains(account_id) {
            return Err(anyhow!("database is read-only"));
        }
        Ok(())
    }
}

impl MailboxStore for FailingMailbox {
    fn get_entity(&self, key: &EntityKey) -> Result<Option<CachedEntity>> {
        self.inner.get_entity(key)
    }

    fn get_tombstone(&self, key: &EntityKey) -> Result<Option<crate::models::Tombstone>> {
        self.inner.get_tombstone(key)
    }

    fn list_entities(
        &self,
        account_id: &AccountId,
        kind: EntityKind,
    ) -> Result<Vec<CachedEntity>> {
        self.inner.list_entities(account_id, kind)
    }

    fn count_entities(&self, account_id: &AccountId) -> Result<usize> {
        self.inner.count_entities(account_id)
    }

    fn upsert(&self, entity: CachedEntity) -> Result<()> {
        self.check(&entity.key.account_id)?;
        self.inner.upsert(entity)
    }

    fn tombstone(&self, key: &EntityKey, seq: u64) -> Result<()> {
        self.check(&key.account_id)?;
        self.inner.tombstone(key, seq)
    }

    fn apply_changes(&self, changes: &ChangeSet) -> Result<()> {
        for key in changes
            .upserts
            .iter()
            .map(|e| &e.key)
            .chain(changes.tombstones.iter().map(|t| &t.key))
        {
            self.check(&key.account_id)?;
        }
        self.inner.apply_changes(changes)
    }

    fn delete_expired(&self, now_secs: i64) -> Result<usize> {
        if self.fail_cleanup {
            return Err(anyhow!("database is locked"));
        }
        self.inner.delete_expired(now_secs)
    }

    fn purge_tombstones(&self, older_than: DateTime<Utc>) -> Result<usize> {
        self.inner.purge_tombstones(older_than)
    }

    fn clear_account(&self, account_id: &AccountId) -> Result<()> {
        self.check(account_id)?;
        self.inner.clear_account(account_id)
    }
}
