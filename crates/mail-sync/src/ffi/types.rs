//! FFI-friendly type wrappers for UniFFI export
//!
//! These types convert internal Rust types to FFI-compatible versions:
//! - `AccountId` → `String`
//! - `Duration` → milliseconds as `u64`
//! - Outcome enums with payloads → flat records

use crate::models::AccountId;
use crate::sync::{
    AccountOutcome, ConnectivityCheck, ConnectivityEvent, ConnectivityListener, SkipReason,
    SyncError, SyncReport,
};

// ============================================================================
// Error Types
// ============================================================================

/// FFI-friendly error type
#[derive(Debug, thiserror::Error, uniffi::Error)]
pub enum SyncServiceError {
    #[error("Storage error: {message}")]
    Storage { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },
}

impl From<anyhow::Error> for SyncServiceError {
    fn from(e: anyhow::Error) -> Self {
        SyncServiceError::Storage {
            message: format!("{:#}", e),
        }
    }
}

// ============================================================================
// Sync Report
// ============================================================================

/// Narrow a count for FFI records, clamping instead of wrapping
pub(crate) fn count_u32(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

/// How one account's sync ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Enum)]
pub enum FfiOutcomeKind {
    Applied,
    NetworkError,
    RemoteError,
    StorageError,
    SkippedNoNetwork,
    SkippedAlreadyRunning,
    SkippedCancelled,
}

/// FFI-friendly per-account outcome
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiAccountOutcome {
    pub account_id: String,
    pub kind: FfiOutcomeKind,
    pub events_applied: u32,
    pub rounds: u32,
    /// Remote reported no further events
    pub drained: bool,
    /// Cached data was rebuilt at the remote's request
    pub refreshed: bool,
    pub error_message: Option<String>,
}

impl FfiAccountOutcome {
    fn new(account_id: &AccountId, outcome: &AccountOutcome) -> Self {
        let mut ffi = Self {
            account_id: account_id.to_string(),
            kind: FfiOutcomeKind::Applied,
            events_applied: 0,
            rounds: 0,
            drained: false,
            refreshed: false,
            error_message: None,
        };

        match outcome {
            AccountOutcome::Applied {
                events,
                rounds,
                drained,
                refreshed,
            } => {
                ffi.events_applied = count_u32(*events);
                ffi.rounds = count_u32(*rounds);
                ffi.drained = *drained;
                ffi.refreshed = *refreshed;
            }
            AccountOutcome::Failed(err) => {
                ffi.kind = match err {
                    SyncError::Network(_) => FfiOutcomeKind::NetworkError,
                    SyncError::Remote(_) => FfiOutcomeKind::RemoteError,
                    SyncError::Storage(_) => FfiOutcomeKind::StorageError,
                };
                ffi.error_message = Some(err.to_string());
            }
            AccountOutcome::Skipped(reason) => {
                ffi.kind = match reason {
                    SkipReason::NoNetwork => FfiOutcomeKind::SkippedNoNetwork,
                    SkipReason::AlreadyRunning => FfiOutcomeKind::SkippedAlreadyRunning,
                    SkipReason::Cancelled => FfiOutcomeKind::SkippedCancelled,
                };
            }
        }
        ffi
    }
}

/// FFI-friendly sync cycle report
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiSyncReport {
    /// Outcomes sorted by account id
    pub outcomes: Vec<FfiAccountOutcome>,
    pub expired_deleted: u32,
    pub tombstones_purged: u32,
    pub cleanup_error: Option<String>,
    pub connectivity_lost: bool,
    pub success: bool,
    pub duration_ms: u64,
}

impl From<SyncReport> for FfiSyncReport {
    fn from(r: SyncReport) -> Self {
        Self {
            outcomes: r
                .outcomes
                .iter()
                .map(|(id, o)| FfiAccountOutcome::new(id, o))
                .collect(),
            expired_deleted: count_u32(r.cleanup.expired_deleted),
            tombstones_purged: count_u32(r.cleanup.tombstones_purged),
            cleanup_error: r.cleanup.error.clone(),
            connectivity_lost: r.connectivity_lost,
            success: r.is_success(),
            duration_ms: r.duration_ms,
        }
    }
}

// ============================================================================
// Connectivity Callback
// ============================================================================

/// Callback interface for the host's network monitor
#[uniffi::export(callback_interface)]
pub trait ConnectivityCallback: Send + Sync {
    /// Whether the device currently has any network
    fn is_connected(&self) -> bool;
    /// Called when a sync cycle detects the network is unreachable
    fn on_connectivity_changed(&self, connected: bool);
}

/// Adapts a host callback to the engine's connectivity check and listener traits
pub(crate) struct HostConnectivity(pub(crate) Box<dyn ConnectivityCallback>);

impl ConnectivityCheck for HostConnectivity {
    fn is_connected(&self) -> bool {
        self.0.is_connected()
    }
}

impl ConnectivityListener for HostConnectivity {
    fn on_connectivity_event(&self, event: ConnectivityEvent) {
        self.0.on_connectivity_changed(event.connected);
    }
}

// ============================================================================
// Log Callback
// ============================================================================

/// Log level for FFI callback
#[derive(Debug, Clone, Copy, uniffi::Enum)]
pub enum FfiLogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<log::Level> for FfiLogLevel {
    fn from(level: log::Level) -> Self {
        match level {
            log::Level::Error => FfiLogLevel::Error,
            log::Level::Warn => FfiLogLevel::Warn,
            log::Level::Info => FfiLogLevel::Info,
            log::Level::Debug => FfiLogLevel::Debug,
            log::Level::Trace => FfiLogLevel::Trace,
        }
    }
}

impl From<FfiLogLevel> for log::Level {
    fn from(level: FfiLogLevel) -> Self {
        match level {
            FfiLogLevel::Error => log::Level::Error,
            FfiLogLevel::Warn => log::Level::Warn,
            FfiLogLevel::Info => log::Level::Info,
            FfiLogLevel::Debug => log::Level::Debug,
            FfiLogLevel::Trace => log::Level::Trace,
        }
    }
}

/// Callback interface for receiving log messages from Rust
///
/// Kotlin should forward these to Logcat.
#[uniffi::export(callback_interface)]
pub trait LogCallback: Send + Sync {
    /// Called when a log message is emitted
    ///
    /// `target` is the module path, e.g. "mail_sync::sync::orchestrator".
    fn on_log(&self, level: FfiLogLevel, target: String, message: String);
}
