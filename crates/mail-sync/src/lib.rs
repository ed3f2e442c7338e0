//! Mail sync crate - event stream synchronization for the local mail cache
//!
//! This crate keeps a device's cached mail state consistent with the server by
//! consuming each account's ordered event stream:
//! - Domain models (accounts, cursors, events, cached entities)
//! - Storage trait abstractions with in-memory and SQLite backends
//! - HTTP event source
//! - Idempotent, resumable sync engine with per-account locking
//! - Expiry cleanup and connectivity notification
//!
//! The engine is synchronous and has zero UI dependencies. Hosts drive it
//! from a background thread, directly or through the UniFFI facade in [`ffi`].

uniffi::setup_scaffolding!();

pub mod config;
pub mod ffi;
pub mod models;
pub mod remote;
pub mod storage;
pub mod sync;

pub use config::SyncSettings;
pub use models::{
    AccountId, CachedEntity, Cursor, EntityKey, EntityKind, Event, EventAction, EventBatch,
    Payload, Tombstone,
};
pub use remote::{EventPage, EventSource, FetchError, HttpEventSource, RemoteEvent};
pub use storage::{ChangeSet, CursorStore, InMemoryStore, MailboxStore, SqliteStore};
pub use sync::{
    // Orchestration
    AccountOutcome, CancelToken, CleanupStats, SkipReason, SyncOptions, SyncOrchestrator,
    SyncReport, SyncRunLocks,
    // Pipeline stages
    ApplyStats, EventFetcher, EventReconciler, FetchOutcome, SyncError,
    // Connectivity
    AlwaysConnected, ConnectivityCheck, ConnectivityEvent, ConnectivityListener,
    IgnoreConnectivity,
    // Scheduling helpers
    timing::{cooldown_elapsed, retry_backoff},
};
