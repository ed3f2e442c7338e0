//! Per-account single-flight locks

use log::debug;
use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};

use crate::models::AccountId;

/// Registry of accounts with a reconciliation in flight
///
/// Shared by every invocation of the orchestrator. Locks are per account:
/// two accounts never contend with each other.
#[derive(Debug, Default)]
pub struct SyncRunLocks {
    held: Mutex<HashSet<AccountId>>,
}

impl SyncRunLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the lock for `account_id`, or `None` if a sync already holds it
    pub fn try_acquire(&self, account_id: &AccountId) -> Option<SyncRunLock<'_>> {
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        if !held.insert(account_id.clone()) {
            return None;
        }
        debug!("Acquired sync lock for {}", account_id);
        Some(SyncRunLock {
            locks: self,
            account_id: account_id.clone(),
        })
    }

    pub fn is_held(&self, account_id: &AccountId) -> bool {
        self.held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(account_id)
    }
}

/// Guard for one account's in-flight sync
///
/// Released on drop, which covers early returns, errors and panics.
#[derive(Debug)]
pub struct SyncRunLock<'a> {
    locks: &'a SyncRunLocks,
    account_id: AccountId,
}

impl Drop for SyncRunLock<'_> {
    fn drop(&mut self) {
        self.locks
            .held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.account_id);
        debug!("Released sync lock for {}", self.account_id);
    }
}
