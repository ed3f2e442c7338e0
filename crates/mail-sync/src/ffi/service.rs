//! SyncService facade for UniFFI export
//!
//! Wraps the SQLite cache, the HTTP event source and the orchestrator behind
//! a small blocking API. Hosts call `run_sync` from a background thread.

use chrono::DateTime;
use log::info;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::config::SyncSettings;
use crate::ffi::types::*;
use crate::models::AccountId;
use crate::remote::HttpEventSource;
use crate::storage::{CursorStore, MailboxStore, SqliteStore};
use crate::sync::{CancelToken, SyncOrchestrator, timing};

/// Main service object for event sync
#[derive(uniffi::Object)]
pub struct SyncService {
    store: Arc<SqliteStore>,
    source: Arc<HttpEventSource>,
    orchestrator: SyncOrchestrator,
    cancel: Mutex<CancelToken>,
}

#[uniffi::export]
impl SyncService {
    /// Create a service over the database at `db_path`
    ///
    /// # Arguments
    /// * `db_path` - Path to the SQLite database file
    /// * `api_base_url` - Base URL of the mail API serving `/events`
    /// * `settings_path` - Optional settings JSON; defaults to the config directory
    /// * `connectivity` - Host network monitor, also notified on connectivity loss
    #[uniffi::constructor]
    pub fn new(
        db_path: String,
        api_base_url: String,
        settings_path: Option<String>,
        connectivity: Box<dyn ConnectivityCallback>,
    ) -> Result<Arc<Self>, SyncServiceError> {
        let settings = match settings_path {
            Some(path) => SyncSettings::from_file(Path::new(&path)),
            None => SyncSettings::load(),
        }
        .map_err(|e| SyncServiceError::Config {
            message: format!("{:#}", e),
        })?;

        if let Some(parent) = PathBuf::from(&db_path).parent() {
            std::fs::create_dir_all(parent).map_err(|e| SyncServiceError::Storage {
                message: format!("Failed to create database directory: {}", e),
            })?;
        }

        let store = Arc::new(SqliteStore::new(&db_path)?);
        let source = Arc::new(
            HttpEventSource::new(&api_base_url, settings.request_timeout()).map_err(|e| {
                SyncServiceError::InvalidArgument {
                    message: format!("{:#}", e),
                }
            })?,
        );
        let host = Arc::new(HostConnectivity(connectivity));

        let orchestrator = SyncOrchestrator::new(
            source.clone(),
            store.clone(),
            store.clone(),
            host.clone(),
            host,
            settings.sync_options(),
        );

        info!("Sync service ready (db: {}, api: {})", db_path, api_base_url);

        Ok(Arc::new(Self {
            store,
            source,
            orchestrator,
            cancel: Mutex::new(CancelToken::new()),
        }))
    }

    // ========================================================================
    // Accounts
    // ========================================================================

    /// Set or replace the access token used to fetch an account's events
    pub fn set_access_token(&self, account_id: String, access_token: String) {
        self.source
            .set_access_token(&AccountId::new(account_id), access_token);
    }

    /// Forget an account: drop its token, cached data and cursor
    pub fn remove_account(&self, account_id: String) -> Result<(), SyncServiceError> {
        let account_id = AccountId::new(account_id);
        self.source.remove_account(&account_id);
        self.store.clear_account(&account_id)?;
        self.store.reset_cursor(&account_id)?;
        info!("Removed account {}", account_id);
        Ok(())
    }

    /// Current cursor for an account; empty if it never synced
    pub fn get_cursor(&self, account_id: String) -> Result<String, SyncServiceError> {
        let cursor = self.store.get_cursor(&AccountId::new(account_id))?;
        Ok(cursor.as_str().to_string())
    }

    /// Number of cached entities for an account
    pub fn cached_entity_count(&self, account_id: String) -> Result<u32, SyncServiceError> {
        let count = self.store.count_entities(&AccountId::new(account_id))?;
        Ok(count_u32(count))
    }

    // ========================================================================
    // Sync
    // ========================================================================

    /// Run one sync cycle for the given logged-in accounts
    ///
    /// Blocks until every account has finished, failed or been skipped.
    /// Per-account failures are reported in the result rather than raised.
    pub fn run_sync(&self, account_ids: Vec<String>) -> FfiSyncReport {
        let cancel = CancelToken::new();
        if let Ok(mut current) = self.cancel.lock() {
            *current = cancel.clone();
        }

        let accounts: Vec<AccountId> = account_ids.into_iter().map(AccountId::new).collect();
        let report = self
            .orchestrator
            .run_for_accounts_with_cancel(&accounts, &cancel);
        FfiSyncReport::from(report)
    }

    /// Ask the running cycle to stop after its current rounds
    pub fn cancel_sync(&self) {
        if let Ok(current) = self.cancel.lock() {
            current.cancel();
        }
    }
}

// ============================================================================
// Standalone Functions
// ============================================================================

/// Seconds to wait before retrying after `consecutive_failures` failed cycles
#[uniffi::export]
pub fn retry_backoff_secs(consecutive_failures: u32) -> u64 {
    timing::retry_backoff(consecutive_failures).as_secs()
}

/// Whether `cooldown_secs` have passed since `last_sync_at` (unix seconds)
#[uniffi::export]
pub fn sync_cooldown_elapsed(last_sync_at: Option<i64>, cooldown_secs: u64) -> bool {
    let last = last_sync_at.and_then(|secs| DateTime::from_timestamp(secs, 0));
    timing::cooldown_elapsed(last, cooldown_secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct Offline(AtomicBool);

    impl ConnectivityCallback for Offline {
        fn is_connected(&self) -> bool {
            false
        }

        fn on_connectivity_changed(&self, _connected: bool) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    fn service(dir: &tempfile::TempDir) -> Arc<SyncService> {
        let settings = dir.path().join("settings.json");
        let mut file = std::fs::File::create(&settings).unwrap();
        write!(file, "{{}}").unwrap();

        SyncService::new(
            dir.path().join("data/mail.db").to_string_lossy().into_owned(),
            "http://127.0.0.1:1/api".to_string(),
            Some(settings.to_string_lossy().into_owned()),
            Box::new(Offline(AtomicBool::new(false))),
        )
        .unwrap()
    }

    #[test]
    fn test_offline_run_skips_accounts() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(&dir);

        let report = service.run_sync(vec!["a1".to_string(), "a2".to_string()]);

        assert!(report.success);
        assert!(!report.connectivity_lost);
        assert_eq!(report.outcomes.len(), 2);
        assert!(
            report
                .outcomes
                .iter()
                .all(|o| o.kind == FfiOutcomeKind::SkippedNoNetwork)
        );
    }

    #[test]
    fn test_remove_account_resets_cursor() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(&dir);
        let account = AccountId::new("a1");
        service
            .store
            .advance_cursor(&account, &crate::models::Cursor::new("c9"))
            .unwrap();

        assert_eq!(service.get_cursor("a1".to_string()).unwrap(), "c9");
        service.remove_account("a1".to_string()).unwrap();
        assert_eq!(service.get_cursor("a1".to_string()).unwrap(), "");
        assert_eq!(service.cached_entity_count("a1".to_string()).unwrap(), 0);
    }

    #[test]
    fn test_invalid_base_url_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let result = SyncService::new(
            dir.path().join("mail.db").to_string_lossy().into_owned(),
            "not a url".to_string(),
            None,
            Box::new(Offline(AtomicBool::new(false))),
        );
        assert!(matches!(
            result,
            Err(SyncServiceError::InvalidArgument { .. } | SyncServiceError::Config { .. })
        ));
    }

    #[test]
    fn test_invalid_settings_rejected_at_startup() {
        let dir = tempfile::tempdir().unwrap();
        let settings = dir.path().join("settings.json");
        std::fs::write(&settings, r#"{ "tombstone_retention_days": 100000000 }"#).unwrap();

        let result = SyncService::new(
            dir.path().join("mail.db").to_string_lossy().into_owned(),
            "http://127.0.0.1:1/api".to_string(),
            Some(settings.to_string_lossy().into_owned()),
            Box::new(Offline(AtomicBool::new(false))),
        );
        assert!(matches!(result, Err(SyncServiceError::Config { .. })));
    }

    #[test]
    fn test_standalone_timing_functions() {
        assert_eq!(retry_backoff_secs(1), 5);
        assert!(sync_cooldown_elapsed(None, 60));
        assert!(sync_cooldown_elapsed(Some(0), 60));
    }
}
