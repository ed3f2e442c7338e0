//! FFI bindings for UniFFI export
//!
//! Kotlin bindings for the sync engine via UniFFI.
//!
//! ## Usage from Kotlin
//!
//! ```kotlin
//! initializeLogging(logcatCallback, FfiLogLevel.INFO)
//!
//! val service = SyncService(
//!     dbPath = "${context.filesDir}/mail.db",
//!     apiBaseUrl = "https://mail.example.com/api/v4",
//!     settingsPath = null,
//!     connectivity = networkMonitor,
//! )
//!
//! service.setAccessToken(accountId, accessToken)
//! val report = service.runSync(listOf(accountId))
//! if (!report.success) {
//!     scheduleRetry(retryBackoffSecs(failures))
//! }
//! ```

mod logging;
mod service;
mod types;

pub use logging::{init_ffi_logger, initialize_logging, set_log_callback, set_log_level};
pub use service::*;
pub use types::*;
