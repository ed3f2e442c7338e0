//! Scheduling helpers for sync cycles
//!
//! Pure functions that hosts use to decide when the next cycle should run.

use chrono::{DateTime, Utc};
use std::time::Duration;

const BASE_RETRY_SECS: u64 = 5;
const MAX_RETRY_EXPONENT: u32 = 8;

/// Check if enough time has elapsed since the last cycle to start a new one.
///
/// Returns `true` if the account never synced.
pub fn cooldown_elapsed(last_sync_at: Option<DateTime<Utc>>, cooldown_secs: u64) -> bool {
    match last_sync_at {
        Some(last) => (Utc::now() - last).num_seconds() >= cooldown_secs as i64,
        None => true,
    }
}

/// Delay before retrying after `consecutive_failures` failed cycles.
///
/// Exponential from 5s, capped at 2^8 * 5s (about 21 minutes). Zero
/// failures means no delay.
pub fn retry_backoff(consecutive_failures: u32) -> Duration {
    if consecutive_failures == 0 {
        return Duration::ZERO;
    }
    let exponent = (consecutive_failures - 1).min(MAX_RETRY_EXPONENT);
    Duration::from_secs(BASE_RETRY_SECS << exponent)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cooldown_never_synced() {
        assert!(cooldown_elapsed(None, 0));
        assert!(cooldown_elapsed(None, 3600));
    }

    #[test]
    fn test_cooldown_boundaries() {
        let recent = Utc::now() - chrono::Duration::seconds(10);
        assert!(!cooldown_elapsed(Some(recent), 30));

        let old = Utc::now() - chrono::Duration::seconds(30);
        assert!(cooldown_elapsed(Some(old), 30));

        assert!(cooldown_elapsed(Some(Utc::now()), 0));
    }

    #[test]
    fn test_retry_backoff_grows_then_caps() {
        assert_eq!(retry_backoff(0), Duration::ZERO);
        assert_eq!(retry_backoff(1), Duration::from_secs(5));
        assert_eq!(retry_backoff(2), Duration::from_secs(10));
        assert_eq!(retry_backoff(4), Duration::from_secs(40));
        assert_eq!(retry_backoff(9), Duration::from_secs(1280));
        assert_eq!(retry_backoff(50), retry_backoff(9));
    }
}
