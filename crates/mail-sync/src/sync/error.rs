//! Sync failure taxonomy

use crate::remote::FetchError;

/// Why one account's sync cycle failed
///
/// None of these escape the orchestrator: each becomes a `Failed` outcome
/// for its account while other accounts carry on.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyncError {
    /// Transient connectivity failure
    #[error("Network error: {0}")]
    Network(String),

    /// Remote answered with an error or a batch that breaks ordering rules
    #[error("Remote error: {0}")]
    Remote(String),

    /// Local persistence failed; nothing was committed
    #[error("Storage error: {0}")]
    Storage(String),
}

impl SyncError {
    /// Wrap a storage failure, keeping its context chain in the message
    pub fn storage(err: anyhow::Error) -> Self {
        SyncError::Storage(format!("{:#}", err))
    }

    pub fn is_connectivity(&self) -> bool {
        matches!(self, SyncError::Network(_))
    }
}

impl From<FetchError> for SyncError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::Network(msg) => SyncError::Network(msg),
            FetchError::Remote(msg) => SyncError::Remote(msg),
        }
    }
}
