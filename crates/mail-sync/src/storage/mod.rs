//! Storage traits and implementations
//!
//! This module defines the storage abstraction layer for the sync core:
//! the per-account cursor store and the local mailbox cache. The trait-based
//! design allows swapping between in-memory and SQLite storage.

mod memory;
mod sqlite;
mod traits;

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{ChangeSet, CursorStore, MailboxStore};
