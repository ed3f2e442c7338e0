//! Applying event batches to the local mailbox

use log::{debug, trace};
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::sync::Arc;

use super::SyncError;
use crate::models::{
    AccountId, CachedEntity, Cursor, EntityKey, Event, EventAction, EventBatch, Payload, Tombstone,
};
use crate::storage::{ChangeSet, CursorStore, MailboxStore};

/// Counts from applying one batch
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ApplyStats {
    /// Events that changed local state
    pub applied: usize,
    /// Events already reflected locally (replays, stale updates)
    pub skipped: usize,
}

/// Current view of one entity while a batch is being planned
#[derive(Debug, Clone)]
enum Slot {
    Absent,
    Live(CachedEntity),
    Deleted(Tombstone),
}

impl Slot {
    /// Highest sequence position already reflected in this slot
    fn last_seq(&self) -> Option<u64> {
        match self {
            Slot::Absent => None,
            Slot::Live(entity) => Some(entity.last_seq),
            Slot::Deleted(tombstone) => Some(tombstone.seq),
        }
    }
}

struct PlannedSlot {
    slot: Slot,
    dirty: bool,
}

/// Applies event batches to the mailbox and advances the cursor
///
/// Application is idempotent: every event is compared against the last
/// sequence position applied to its entity (or the tombstone left by a
/// delete), so replaying a batch after a crash between the mailbox commit
/// and the cursor advance changes nothing.
pub struct EventReconciler {
    mailbox: Arc<dyn MailboxStore>,
    cursors: Arc<dyn CursorStore>,
}

impl EventReconciler {
    pub fn new(mailbox: Arc<dyn MailboxStore>, cursors: Arc<dyn CursorStore>) -> Self {
        Self { mailbox, cursors }
    }

    /// Apply a batch atomically, then commit its cursor
    ///
    /// On error nothing from the batch is visible and the cursor is left
    /// where it was.
    pub fn apply(&self, batch: &EventBatch) -> Result<ApplyStats, SyncError> {
        let (changes, stats) = self.plan(batch)?;

        if !changes.is_empty() {
            self.mailbox
                .apply_changes(&changes)
                .map_err(SyncError::storage)?;
        }

        self.cursors
            .advance_cursor(&batch.account_id, &batch.next_cursor)
            .map_err(SyncError::storage)?;

        debug!(
            "Applied batch for {}: {} applied, {} skipped, cursor now {}",
            batch.account_id, stats.applied, stats.skipped, batch.next_cursor
        );
        Ok(stats)
    }

    /// Drop an account's cached data and restart its stream at `cursor`
    pub fn reset(&self, account_id: &AccountId, cursor: &Cursor) -> Result<(), SyncError> {
        self.mailbox
            .clear_account(account_id)
            .map_err(SyncError::storage)?;
        self.cursors
            .advance_cursor(account_id, cursor)
            .map_err(SyncError::storage)?;
        debug!("Reset {} to cursor {}", account_id, cursor);
        Ok(())
    }

    /// Compute the final state of every entity the batch touches
    fn plan(&self, batch: &EventBatch) -> Result<(ChangeSet, ApplyStats), SyncError> {
        let mut slots: BTreeMap<EntityKey, PlannedSlot> = BTreeMap::new();
        let mut stats = ApplyStats::default();

        for event in &batch.events {
            if event.account_id != batch.account_id {
                return Err(SyncError::Remote(format!(
                    "Event {} belongs to {}, not {}",
                    event.seq, event.account_id, batch.account_id
                )));
            }

            let key = event.key();
            let planned = match slots.entry(key.clone()) {
                Entry::Occupied(entry) => entry.into_mut(),
                Entry::Vacant(entry) => entry.insert(PlannedSlot {
                    slot: self.load_slot(&key)?,
                    dirty: false,
                }),
            };

            if planned.slot.last_seq().is_some_and(|seen| event.seq <= seen) {
                trace!("Skipping stale event {} for {:?}", event.seq, key);
                stats.skipped += 1;
                continue;
            }

            let current = std::mem::replace(&mut planned.slot, Slot::Absent);
            planned.slot = next_slot(current, event, key);
            planned.dirty = true;
            stats.applied += 1;
        }

        let mut changes = ChangeSet::default();
        for planned in slots.into_values().filter(|p| p.dirty) {
            match planned.slot {
                Slot::Live(entity) => changes.upserts.push(entity),
                Slot::Deleted(tombstone) => changes.tombstones.push(tombstone),
                Slot::Absent => {}
            }
        }

        Ok((changes, stats))
    }

    fn load_slot(&self, key: &EntityKey) -> Result<Slot, SyncError> {
        if let Some(entity) = self.mailbox.get_entity(key).map_err(SyncError::storage)? {
            return Ok(Slot::Live(entity));
        }
        if let Some(tombstone) = self.mailbox.get_tombstone(key).map_err(SyncError::storage)? {
            return Ok(Slot::Deleted(tombstone));
        }
        Ok(Slot::Absent)
    }
}

/// State of an entity after applying a (non-stale) event
fn next_slot(current: Slot, event: &Event, key: EntityKey) -> Slot {
    match event.action {
        EventAction::Delete => Slot::Deleted(Tombstone::new(key, event.seq)),
        EventAction::Create => Slot::Live(from_payload(key, &event.payload, event.seq)),
        EventAction::Update => match current {
            Slot::Live(entity) => Slot::Live(entity.merged(&event.payload, event.seq)),
            // Update for an entity we never saw (or saw deleted earlier):
            // keep whatever fields the update carries
            Slot::Absent | Slot::Deleted(_) => {
                Slot::Live(from_payload(key, &event.payload, event.seq))
            }
        },
    }
}

fn from_payload(key: EntityKey, payload: &Payload, seq: u64) -> CachedEntity {
    CachedEntity::new(key, Payload::new(), seq).merged(payload, seq)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EntityKind, EventBatch};
    use crate::storage::InMemoryStore;
    use crate::sync::testing::{FailingMailbox, fields, message_key};
    use serde_json::json;

    fn event(seq: u64, id: &str, action: EventAction, payload: serde_json::Value) -> Event {
        Event {
            account_id: AccountId::new("x"),
            seq,
            entity: EntityKind::Message,
            entity_id: id.to_string(),
            action,
            payload: fields(payload),
        }
    }

    fn batch(from: &str, events: Vec<Event>, next: &str) -> EventBatch {
        EventBatch {
            account_id: AccountId::new("x"),
            from: Cursor::new(from),
            events,
            next_cursor: Cursor::new(next),
            has_more: false,
        }
    }

    fn reconciler(store: &Arc<InMemoryStore>) -> EventReconciler {
        EventReconciler::new(store.clone(), store.clone())
    }

    /// Live entity fields, ignoring bookkeeping timestamps
    fn snapshot(store: &InMemoryStore) -> Vec<(String, Payload, u64)> {
        store
            .list_entities(&AccountId::new("x"), EntityKind::Message)
            .unwrap()
            .into_iter()
            .map(|e| (e.key.id, e.fields, e.last_seq))
            .collect()
    }

    #[test]
    fn test_three_event_batch_advances_cursor() {
        let store = Arc::new(InMemoryStore::new());
        let account = AccountId::new("x");
        store.advance_cursor(&account, &Cursor::new("C0")).unwrap();

        let b = batch(
            "C0",
            vec![
                event(1, "e1", EventAction::Create, json!({"subject": "one"})),
                event(2, "e1", EventAction::Delete, json!({})),
                event(3, "e2", EventAction::Create, json!({"subject": "two"})),
            ],
            "C3",
        );

        let stats = reconciler(&store).apply(&b).unwrap();

        assert_eq!(stats, ApplyStats { applied: 3, skipped: 0 });
        assert_eq!(store.get_cursor(&account).unwrap(), Cursor::new("C3"));
        assert!(store.get_entity(&message_key("x", "e1")).unwrap().is_none());
        assert_eq!(store.get_tombstone(&message_key("x", "e1")).unwrap().unwrap().seq, 2);
        assert!(store.get_entity(&message_key("x", "e2")).unwrap().is_some());
    }

    #[test]
    fn test_applying_same_batch_twice_is_idempotent() {
        let store = Arc::new(InMemoryStore::new());
        let b = batch(
            "C0",
            vec![
                event(1, "m1", EventAction::Create, json!({"subject": "a", "unread": true})),
                event(2, "m1", EventAction::Update, json!({"unread": false})),
                event(3, "m2", EventAction::Create, json!({"subject": "b"})),
                event(4, "m2", EventAction::Delete, json!({})),
            ],
            "C4",
        );

        let first = reconciler(&store).apply(&b).unwrap();
        let after_first = snapshot(&store);

        let second = reconciler(&store).apply(&b).unwrap();
        let after_second = snapshot(&store);

        assert_eq!(first.applied, 4);
        assert_eq!(second, ApplyStats { applied: 0, skipped: 4 });
        assert_eq!(after_first, after_second);
    }

    #[test]
    fn test_stale_update_after_delete_is_ignored() {
        let store = Arc::new(InMemoryStore::new());
        let rec = reconciler(&store);

        rec.apply(&batch(
            "C0",
            vec![
                event(1, "E", EventAction::Create, json!({"subject": "s"})),
                event(5, "E", EventAction::Delete, json!({})),
            ],
            "C5",
        ))
        .unwrap();

        let stats = rec
            .apply(&batch(
                "C5",
                vec![event(4, "E", EventAction::Update, json!({"subject": "stale"}))],
                "C5b",
            ))
            .unwrap();

        assert_eq!(stats.skipped, 1);
        assert!(store.get_entity(&message_key("x", "E")).unwrap().is_none());
    }

    #[test]
    fn test_stale_create_does_not_resurrect() {
        let store = Arc::new(InMemoryStore::new());
        store.tombstone(&message_key("x", "E"), 10).unwrap();

        reconciler(&store)
            .apply(&batch(
                "C0",
                vec![event(9, "E", EventAction::Create, json!({"subject": "zombie"}))],
                "C1",
            ))
            .unwrap();

        assert!(store.get_entity(&message_key("x", "E")).unwrap().is_none());
    }

    #[test]
    fn test_update_before_create_builds_entity_from_payload() {
        let store = Arc::new(InMemoryStore::new());

        reconciler(&store)
            .apply(&batch(
                "C0",
                vec![event(
                    7,
                    "m1",
                    EventAction::Update,
                    json!({"unread": false, "starred": null}),
                )],
                "C7",
            ))
            .unwrap();

        let entity = store.get_entity(&message_key("x", "m1")).unwrap().unwrap();
        assert_eq!(entity.fields, fields(json!({"unread": false})));
        assert_eq!(entity.last_seq, 7);
    }

    #[test]
    fn test_update_merges_into_existing_fields() {
        let store = Arc::new(InMemoryStore::new());
        let rec = reconciler(&store);

        rec.apply(&batch(
            "C0",
            vec![event(1, "m1", EventAction::Create, json!({"subject": "Hi", "unread": true}))],
            "C1",
        ))
        .unwrap();
        rec.apply(&batch(
            "C1",
            vec![event(2, "m1", EventAction::Update, json!({"unread": false}))],
            "C2",
        ))
        .unwrap();

        let entity = store.get_entity(&message_key("x", "m1")).unwrap().unwrap();
        assert_eq!(entity.fields, fields(json!({"subject": "Hi", "unread": false})));
    }

    #[test]
    fn test_storage_failure_leaves_cursor_and_store_untouched() {
        let inner = Arc::new(InMemoryStore::new());
        let failing = Arc::new(FailingMailbox::new(inner.clone()));
        failing.fail_writes_for("x");
        inner
            .advance_cursor(&AccountId::new("x"), &Cursor::new("C0"))
            .unwrap();

        let rec = EventReconciler::new(failing, inner.clone());
        let err = rec
            .apply(&batch(
                "C0",
                vec![event(1, "m1", EventAction::Create, json!({"subject": "a"}))],
                "C1",
            ))
            .unwrap_err();

        assert!(matches!(err, SyncError::Storage(_)));
        assert_eq!(inner.get_cursor(&AccountId::new("x")).unwrap(), Cursor::new("C0"));
        assert_eq!(inner.count_entities(&AccountId::new("x")).unwrap(), 0);
    }

    #[test]
    fn test_foreign_account_event_rejected() {
        let store = Arc::new(InMemoryStore::new());
        let mut stray = event(1, "m1", EventAction::Create, json!({}));
        stray.account_id = AccountId::new("someone-else");

        let err = reconciler(&store)
            .apply(&batch("C0", vec![stray], "C1"))
            .unwrap_err();

        assert!(matches!(err, SyncError::Remote(_)));
        assert!(store.get_cursor(&AccountId::new("x")).unwrap().is_start());
    }

    #[test]
    fn test_reset_clears_account_and_moves_cursor() {
        let store = Arc::new(InMemoryStore::new());
        let rec = reconciler(&store);
        rec.apply(&batch(
            "C0",
            vec![event(1, "m1", EventAction::Create, json!({"subject": "a"}))],
            "C1",
        ))
        .unwrap();

        rec.reset(&AccountId::new("x"), &Cursor::new("R1")).unwrap();

        assert_eq!(store.count_entities(&AccountId::new("x")).unwrap(), 0);
        assert_eq!(store.get_cursor(&AccountId::new("x")).unwrap(), Cursor::new("R1"));
    }
}
