//! Remote mutation events and the batches they arrive in

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::{AccountId, Cursor, EntityKey, Payload};

/// Kind of cached entity an event refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Message,
    Conversation,
    Label,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Message => "message",
            EntityKind::Conversation => "conversation",
            EntityKind::Label => "label",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "message" => Ok(EntityKind::Message),
            "conversation" => Ok(EntityKind::Conversation),
            "label" => Ok(EntityKind::Label),
            other => Err(anyhow::anyhow!("Unknown entity kind: {}", other)),
        }
    }
}

/// What an event does to its entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventAction {
    Create,
    /// Partial update; also covers flag-only updates (read, starred)
    #[serde(alias = "update_flags")]
    Update,
    Delete,
}

/// One remote mutation, immutable once produced
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub account_id: AccountId,
    /// Position in the account's event stream, strictly ascending
    pub seq: u64,
    pub entity: EntityKind,
    pub entity_id: String,
    pub action: EventAction,
    /// Fields carried by create/update events; empty for deletes
    pub payload: Payload,
}

impl Event {
    pub fn key(&self) -> EntityKey {
        EntityKey::new(self.account_id.clone(), self.entity, self.entity_id.clone())
    }
}

/// Ordered run of events that is contiguous with the account's cursor
///
/// `next_cursor` is committed only when every event in the batch has been
/// applied.
#[derive(Debug, Clone, PartialEq)]
pub struct EventBatch {
    pub account_id: AccountId,
    /// Cursor the batch was fetched from
    pub from: Cursor,
    pub events: Vec<Event>,
    pub next_cursor: Cursor,
    /// Remote has more events past `next_cursor`
    pub has_more: bool,
}

impl EventBatch {
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
