//! Remote event source contract
//!
//! The sync core only needs "give me the events after this cursor" from
//! the server. Anything that can answer that, over any transport, can be
//! plugged in as an [`EventSource`].

mod http;

use serde::Deserialize;

use crate::models::{AccountId, Cursor, EntityKind, EventAction, Payload};

pub use http::HttpEventSource;

/// Failure to fetch events, classified at the source
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    /// The server could not be reached (refused, DNS, timeout, reset)
    #[error("Cannot connect to event server: {0}")]
    Network(String),

    /// The server answered, but with an error or an unusable body
    #[error("Event server error: {0}")]
    Remote(String),
}

impl FetchError {
    /// Whether this failure means the device is effectively offline
    pub fn is_connectivity(&self) -> bool {
        matches!(self, FetchError::Network(_))
    }
}

/// One event as sent by the server
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RemoteEvent {
    pub seq: u64,
    pub entity: EntityKind,
    pub entity_id: String,
    pub action: EventAction,
    #[serde(default)]
    pub payload: Payload,
}

/// A page of events past a cursor
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EventPage {
    #[serde(default)]
    pub events: Vec<RemoteEvent>,
    pub next_cursor: Cursor,
    #[serde(default)]
    pub has_more: bool,
    /// Server no longer has history for the cursor; local cache must be rebuilt
    #[serde(default)]
    pub refresh: bool,
}

/// Source of per-account event pages
///
/// Calling it repeatedly with the same cursor must be safe and return the
/// same events (or a superset continuing past them).
pub trait EventSource: Send + Sync {
    fn fetch_events(&self, account_id: &AccountId, since: &Cursor)
    -> Result<EventPage, FetchError>;
}
