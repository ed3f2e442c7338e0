//! Sync settings
//!
//! Loaded from `sync-settings.json` in the mail-sync config directory. A
//! missing file, or missing keys, fall back to the defaults.

use anyhow::{Result, ensure};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::sync::{DEFAULT_MAX_ROUNDS, SyncOptions};

/// Settings filename in the mail-sync config directory
pub const SETTINGS_FILE: &str = "sync-settings.json";

/// Upper bound for `tombstone_retention_days` (ten years)
pub const MAX_TOMBSTONE_RETENTION_DAYS: i64 = 3650;

/// Tunables for the sync engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Fetch/apply rounds per account per cycle
    pub max_rounds: usize,
    /// Timeout for a single event request
    pub request_timeout_secs: u64,
    /// Wall-clock budget per account per cycle
    pub account_time_budget_secs: u64,
    /// Days a delete tombstone is kept
    pub tombstone_retention_days: i64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            max_rounds: DEFAULT_MAX_ROUNDS,
            request_timeout_secs: 30,
            account_time_budget_secs: 120,
            tombstone_retention_days: 30,
        }
    }
}

impl SyncSettings {
    /// Load from the default config directory, or defaults if absent
    pub fn load() -> Result<Self> {
        let settings: Self = config::load_json_or_default(SETTINGS_FILE)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load from a specific JSON file
    pub fn from_file(path: &Path) -> Result<Self> {
        let settings: Self = config::load_json_file(path)?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        ensure!(self.max_rounds > 0, "max_rounds must be at least 1");
        ensure!(
            self.request_timeout_secs > 0,
            "request_timeout_secs must be at least 1"
        );
        ensure!(
            self.account_time_budget_secs > 0,
            "account_time_budget_secs must be at least 1"
        );
        ensure!(
            (0..=MAX_TOMBSTONE_RETENTION_DAYS).contains(&self.tombstone_retention_days),
            "tombstone_retention_days must be between 0 and {}",
            MAX_TOMBSTONE_RETENTION_DAYS
        );
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn sync_options(&self) -> SyncOptions {
        SyncOptions {
            max_rounds: self.max_rounds,
            account_time_budget: Duration::from_secs(self.account_time_budget_secs),
            tombstone_retention: chrono::Duration::days(self.tombstone_retention_days),
        }
    }
}
