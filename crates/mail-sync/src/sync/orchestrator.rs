//! Multi-account sync orchestration
//!
//! One invocation of [`SyncOrchestrator::run_for_accounts`] is one sync
//! cycle: purge expired cache entries, then drain each account's event
//! stream in parallel, one in-flight sync per account.

use anyhow::anyhow;
use chrono::Utc;
use log::{debug, error, info, warn};
use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use super::connectivity::{ConnectivityCheck, ConnectivityEvent, ConnectivityListener};
use super::fetcher::{EventFetcher, FetchOutcome};
use super::locks::SyncRunLocks;
use super::reconciler::EventReconciler;
use super::SyncError;
use crate::models::AccountId;
use crate::remote::EventSource;
use crate::storage::{CursorStore, MailboxStore};

/// Default cap on fetch/apply rounds per account per cycle
pub const DEFAULT_MAX_ROUNDS: usize = 20;

/// Tuning for a sync cycle
#[derive(Debug, Clone, PartialEq)]
pub struct SyncOptions {
    /// Stop an account after this many rounds and resume next cycle
    pub max_rounds: usize,
    /// Stop starting new rounds for an account once this much time has passed
    pub account_time_budget: Duration,
    /// How long delete tombstones are kept to reject stale replays
    pub tombstone_retention: chrono::Duration,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            max_rounds: DEFAULT_MAX_ROUNDS,
            account_time_budget: Duration::from_secs(120),
            tombstone_retention: chrono::Duration::days(30),
        }
    }
}

/// Cooperative cancellation for a running cycle
///
/// Checked between rounds; a round already in progress finishes (or fails)
/// atomically.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Why an account was not synced this cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NoNetwork,
    /// Another cycle still holds the account's lock
    AlreadyRunning,
    Cancelled,
}

/// Result of one account's part of a cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountOutcome {
    Applied {
        /// Events that changed local state
        events: usize,
        rounds: usize,
        /// The remote reported no further events
        drained: bool,
        /// Cached data was rebuilt at the remote's request
        refreshed: bool,
    },
    Failed(SyncError),
    Skipped(SkipReason),
}

/// What the expiry pass did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupStats {
    pub expired_deleted: usize,
    pub tombstones_purged: usize,
    pub error: Option<String>,
}

/// Aggregate result of a sync cycle
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncReport {
    pub outcomes: BTreeMap<AccountId, AccountOutcome>,
    pub cleanup: CleanupStats,
    /// A connectivity-lost notification was emitted
    pub connectivity_lost: bool,
    pub duration_ms: u64,
}

impl SyncReport {
    /// No account failed (skips do not count as failures)
    pub fn is_success(&self) -> bool {
        !self
            .outcomes
            .values()
            .any(|o| matches!(o, AccountOutcome::Failed(_)))
    }

    /// Total events applied across all accounts
    pub fn events_applied(&self) -> usize {
        self.outcomes
            .values()
            .map(|o| match o {
                AccountOutcome::Applied { events, .. } => *events,
                _ => 0,
            })
            .sum()
    }

    pub fn failed_accounts(&self) -> Vec<&AccountId> {
        self.outcomes
            .iter()
            .filter(|(_, o)| matches!(o, AccountOutcome::Failed(_)))
            .map(|(id, _)| id)
            .collect()
    }

    pub fn outcome(&self, account_id: &AccountId) -> Option<&AccountOutcome> {
        self.outcomes.get(account_id)
    }
}

/// Coordinates fetch and reconciliation across logged-in accounts
///
/// All collaborators are injected, so tests can substitute fakes for the
/// event source and stores.
pub struct SyncOrchestrator {
    fetcher: EventFetcher,
    reconciler: EventReconciler,
    mailbox: Arc<dyn MailboxStore>,
    connectivity: Arc<dyn ConnectivityCheck>,
    listener: Arc<dyn ConnectivityListener>,
    locks: Arc<SyncRunLocks>,
    options: SyncOptions,
}

impl SyncOrchestrator {
    pub fn new(
        source: Arc<dyn EventSource>,
        mailbox: Arc<dyn MailboxStore>,
        cursors: Arc<dyn CursorStore>,
        connectivity: Arc<dyn ConnectivityCheck>,
        listener: Arc<dyn ConnectivityListener>,
        options: SyncOptions,
    ) -> Self {
        Self {
            fetcher: EventFetcher::new(source, cursors.clone()),
            reconciler: EventReconciler::new(mailbox.clone(), cursors),
            mailbox,
            connectivity,
            listener,
            locks: Arc::new(SyncRunLocks::new()),
            options,
        }
    }

    pub fn locks(&self) -> &Arc<SyncRunLocks> {
        &self.locks
    }

    /// Run one sync cycle for the given accounts
    pub fn run_for_accounts(&self, accounts: &[AccountId]) -> SyncReport {
        self.run_for_accounts_with_cancel(accounts, &CancelToken::new())
    }

    /// Run one sync cycle, stopping between rounds once `cancel` fires
    pub fn run_for_accounts_with_cancel(
        &self,
        accounts: &[AccountId],
        cancel: &CancelToken,
    ) -> SyncReport {
        let start = Instant::now();
        let accounts: BTreeSet<&AccountId> = accounts.iter().collect();
        let mut report = SyncReport {
            cleanup: self.cleanup(),
            ..Default::default()
        };

        if !self.connectivity.is_connected() {
            info!("No network, skipping event fetch for {} accounts", accounts.len());
            report.outcomes = accounts
                .into_iter()
                .map(|a| (a.clone(), AccountOutcome::Skipped(SkipReason::NoNetwork)))
                .collect();
            report.duration_ms = start.elapsed().as_millis() as u64;
            return report;
        }

        info!("Syncing {} accounts", accounts.len());
        report.outcomes = accounts
            .into_par_iter()
            .map(|account| (account.clone(), self.sync_account(account, cancel)))
            .collect();

        let connectivity_failure = report
            .outcomes
            .values()
            .any(|o| matches!(o, AccountOutcome::Failed(e) if e.is_connectivity()));
        if connectivity_failure {
            self.listener
                .on_connectivity_event(ConnectivityEvent { connected: false });
            report.connectivity_lost = true;
        }

        report.duration_ms = start.elapsed().as_millis() as u64;
        info!(
            "Sync cycle finished in {}ms: {} events applied, {} accounts failed",
            report.duration_ms,
            report.events_applied(),
            report.failed_accounts().len()
        );
        report
    }

    /// Purge expired entities and old tombstones; purely local
    fn cleanup(&self) -> CleanupStats {
        let now = Utc::now();
        let mut stats = CleanupStats::default();

        match self.mailbox.delete_expired(now.timestamp()) {
            Ok(count) => {
                if count > 0 {
                    info!("Deleted {} expired entities", count);
                }
                stats.expired_deleted = count;
            }
            Err(e) => {
                warn!("Expiry cleanup failed: {:#}", e);
                stats.error = Some(format!("{:#}", e));
            }
        }

        let purged = now
            .checked_sub_signed(self.options.tombstone_retention)
            .ok_or_else(|| {
                anyhow!(
                    "Tombstone retention of {} days is out of range",
                    self.options.tombstone_retention.num_days()
                )
            })
            .and_then(|cutoff| self.mailbox.purge_tombstones(cutoff));
        match purged {
            Ok(count) => stats.tombstones_purged = count,
            Err(e) => {
                warn!("Tombstone purge failed: {:#}", e);
                if stats.error.is_none() {
                    stats.error = Some(format!("{:#}", e));
                }
            }
        }

        stats
    }

    fn sync_account(&self, account_id: &AccountId, cancel: &CancelToken) -> AccountOutcome {
        let Some(_lock) = self.locks.try_acquire(account_id) else {
            info!("Sync already running for {}, skipping", account_id);
            return AccountOutcome::Skipped(SkipReason::AlreadyRunning);
        };

        // The coarse check can be stale by the time this account runs
        if !self.connectivity.is_connected() {
            return AccountOutcome::Skipped(SkipReason::NoNetwork);
        }

        match self.drain_account(account_id, cancel) {
            Ok(outcome) => outcome,
            Err(e) => {
                if e.is_connectivity() {
                    warn!("Sync for {} lost connectivity: {}", account_id, e);
                } else {
                    error!("Sync for {} failed: {}", account_id, e);
                }
                AccountOutcome::Failed(e)
            }
        }
    }

    fn drain_account(
        &self,
        account_id: &AccountId,
        cancel: &CancelToken,
    ) -> Result<AccountOutcome, SyncError> {
        let started = Instant::now();
        let mut events = 0;
        let mut rounds = 0;
        let mut drained = false;
        let mut refreshed = false;

        loop {
            if cancel.is_cancelled() {
                info!("Sync for {} cancelled after {} rounds", account_id, rounds);
                if rounds == 0 {
                    return Ok(AccountOutcome::Skipped(SkipReason::Cancelled));
                }
                break;
            }
            if rounds >= self.options.max_rounds {
                info!(
                    "Sync for {} hit the {} round cap, resuming next cycle",
                    account_id, self.options.max_rounds
                );
                break;
            }
            if started.elapsed() >= self.options.account_time_budget {
                warn!(
                    "Sync for {} exceeded its time budget after {} rounds",
                    account_id, rounds
                );
                break;
            }

            match self.fetcher.fetch_next(account_id)? {
                FetchOutcome::NoUpdates => {
                    drained = true;
                    break;
                }
                FetchOutcome::RefreshRequired { next_cursor } => {
                    warn!("Rebuilding cache for {} at remote request", account_id);
                    self.reconciler.reset(account_id, &next_cursor)?;
                    refreshed = true;
                    rounds += 1;
                }
                FetchOutcome::Batch(batch) => {
                    let stats = self.reconciler.apply(&batch)?;
                    events += stats.applied;
                    rounds += 1;
                    if !batch.has_more {
                        drained = true;
                        break;
                    }
                }
            }
        }

        debug!(
            "Sync for {} done: {} events in {} rounds (drained: {})",
            account_id, events, rounds, drained
        );
        Ok(AccountOutcome::Applied {
            events,
            rounds,
            drained,
            refreshed,
        })
    }
}
