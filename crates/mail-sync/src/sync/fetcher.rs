//! Event fetching with batch validation

use log::debug;
use std::sync::Arc;

use super::SyncError;
use crate::models::{AccountId, Cursor, Event, EventBatch};
use crate::remote::{EventPage, EventSource};
use crate::storage::CursorStore;

/// Result of asking the remote for the next batch
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    /// Events past the cursor, ready for reconciliation
    Batch(EventBatch),
    /// Nothing new past the cursor
    NoUpdates,
    /// Remote has no history for the cursor; rebuild from `next_cursor`
    RefreshRequired { next_cursor: Cursor },
}

/// Pulls the next batch of events for one account from its stored cursor
pub struct EventFetcher {
    source: Arc<dyn EventSource>,
    cursors: Arc<dyn CursorStore>,
}

impl EventFetcher {
    pub fn new(source: Arc<dyn EventSource>, cursors: Arc<dyn CursorStore>) -> Self {
        Self { source, cursors }
    }

    /// Fetch starting from the account's stored cursor
    pub fn fetch_next(&self, account_id: &AccountId) -> Result<FetchOutcome, SyncError> {
        let cursor = self
            .cursors
            .get_cursor(account_id)
            .map_err(SyncError::storage)?;
        self.fetch(account_id, &cursor)
    }

    /// Fetch the events past `from`
    ///
    /// Pages whose events are not strictly ascending, or that carry events
    /// without a cursor to commit, are rejected as remote errors.
    pub fn fetch(&self, account_id: &AccountId, from: &Cursor) -> Result<FetchOutcome, SyncError> {
        let page = self.source.fetch_events(account_id, from)?;

        if page.refresh {
            debug!("Remote requested refresh for {} at {}", account_id, from);
            return Ok(FetchOutcome::RefreshRequired {
                next_cursor: page.next_cursor,
            });
        }

        if page.events.is_empty() && (page.next_cursor == *from || page.next_cursor.is_start()) {
            return Ok(FetchOutcome::NoUpdates);
        }

        validate_page(&page)?;

        let events = page
            .events
            .into_iter()
            .map(|e| Event {
                account_id: account_id.clone(),
                seq: e.seq,
                entity: e.entity,
                entity_id: e.entity_id,
                action: e.action,
                payload: e.payload,
            })
            .collect::<Vec<_>>();

        debug!(
            "Fetched {} events for {} ({} -> {})",
            events.len(),
            account_id,
            from,
            page.next_cursor
        );

        Ok(FetchOutcome::Batch(EventBatch {
            account_id: account_id.clone(),
            from: from.clone(),
            events,
            next_cursor: page.next_cursor,
            has_more: page.has_more,
        }))
    }
}

fn validate_page(page: &EventPage) -> Result<(), SyncError> {
    if page.next_cursor.is_start() {
        return Err(SyncError::Remote(
            "Event page has events but no next cursor".to_string(),
        ));
    }

    for pair in page.events.windows(2) {
        if pair[1].seq <= pair[0].seq {
            return Err(SyncError::Remote(format!(
                "Events out of order: {} followed by {}",
                pair[0].seq, pair[1].seq
            )));
        }
    }

    if page.events.iter().any(|e| e.entity_id.is_empty()) {
        return Err(SyncError::Remote("Event without entity id".to_string()));
    }

    Ok(())
}
