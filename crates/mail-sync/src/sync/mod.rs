//! Event sync engine
//!
//! Pulls each account's event stream from its cursor and folds the events
//! into the local cache. Every step can be retried: replaying a batch whose
//! cursor never advanced leaves the cache unchanged.

mod connectivity;
mod error;
mod fetcher;
mod locks;
mod orchestrator;
mod reconciler;
#[cfg(test)]
mod testing;
pub mod timing;

pub use connectivity::{
    AlwaysConnected, ConnectivityCheck, ConnectivityEvent, ConnectivityListener,
    IgnoreConnectivity,
};
pub use error::SyncError;
pub use fetcher::{EventFetcher, FetchOutcome};
pub use locks::{SyncRunLock, SyncRunLocks};
pub use orchestrator::{
    AccountOutcome, CancelToken, CleanupStats, DEFAULT_MAX_ROUNDS, SkipReason, SyncOptions,
    SyncOrchestrator, SyncReport,
};
pub use reconciler::{ApplyStats, EventReconciler};
