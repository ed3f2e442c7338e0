//! Domain models for the event sync core

mod account;
mod cursor;
mod entity;
mod event;

pub use account::AccountId;
pub use cursor::Cursor;
pub use entity::{CachedEntity, EXPIRATION_FIELD, EntityKey, Payload, Tombstone};
pub use event::{EntityKind, Event, EventAction, EventBatch};
