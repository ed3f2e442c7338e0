//! Locally cached projections of remote entities

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{AccountId, EntityKind};

/// Field bag carried by events and stored on cached entities
pub type Payload = serde_json::Map<String, serde_json::Value>;

/// Payload field holding the expiry time in unix seconds (0 = never)
pub const EXPIRATION_FIELD: &str = "expiration_time";

/// Identity of a cached entity, partitioned by account
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityKey {
    pub account_id: AccountId,
    pub kind: EntityKind,
    pub id: String,
}

impl EntityKey {
    pub fn new(account_id: AccountId, kind: EntityKind, id: impl Into<String>) -> Self {
        Self {
            account_id,
            kind,
            id: id.into(),
        }
    }
}

/// A message, conversation or label as persisted in the local mailbox
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedEntity {
    pub key: EntityKey,
    pub fields: Payload,
    /// Sequence position of the last event applied to this entity
    pub last_seq: u64,
    /// Unix seconds after which the entity may be purged
    pub expires_at: Option<i64>,
    pub updated_at: DateTime<Utc>,
}

impl CachedEntity {
    /// Build an entity from a payload, deriving its expiry
    pub fn new(key: EntityKey, fields: Payload, last_seq: u64) -> Self {
        let expires_at = expiry_from_fields(&fields);
        Self {
            key,
            fields,
            last_seq,
            expires_at,
            updated_at: Utc::now(),
        }
    }

    /// Merge a partial payload over the current fields
    ///
    /// Fields absent from `patch` keep their value; a `null` in the patch
    /// clears the field.
    pub fn merged(mut self, patch: &Payload, seq: u64) -> Self {
        for (name, value) in patch {
            if value.is_null() {
                self.fields.remove(name);
            } else {
                self.fields.insert(name.clone(), value.clone());
            }
        }
        self.last_seq = seq;
        self.expires_at = expiry_from_fields(&self.fields);
        self.updated_at = Utc::now();
        self
    }

    /// Whether the entity is due for purging at `now_secs`
    pub fn is_expired(&self, now_secs: i64) -> bool {
        self.expires_at.is_some_and(|at| at <= now_secs)
    }
}

/// Marker left behind by a delete event
///
/// Any later-replayed create or update at or below `seq` is stale and must
/// not resurrect the entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tombstone {
    pub key: EntityKey,
    pub seq: u64,
    pub deleted_at: DateTime<Utc>,
}

impl Tombstone {
    pub fn new(key: EntityKey, seq: u64) -> Self {
        Self {
            key,
            seq,
            deleted_at: Utc::now(),
        }
    }
}

fn expiry_from_fields(fields: &Payload) -> Option<i64> {
    fields
        .get(EXPIRATION_FIELD)
        .and_then(|v| v.as_i64())
        .filter(|&at| at > 0)
}
