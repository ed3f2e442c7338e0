//! Per-account event stream position

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque position in an account's remote event stream
///
/// Marks the last event batch that was fully applied locally. The value
/// is minted by the remote and never interpreted here, except for the
/// empty "start" sentinel used before anything has been applied.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cursor(String);

impl Cursor {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The sentinel cursor for an account that has never synced
    pub fn start() -> Self {
        Self(String::new())
    }

    pub fn is_start(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_start() {
            f.write_str("<start>")
        } else {
            f.write_str(&self.0)
        }
    }
}
