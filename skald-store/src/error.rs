use std::time::Duration;

use thiserror::Error;
use tokio_rusqlite::rusqlite;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("store connection error: {0}")]
    Connection(#[from] tokio_rusqlite::Error),

    #[error("store operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("value at {key} is not an integer")]
    NotAnInteger { key: String },
}

impl StoreError {
    /// Whether the store could not be reached at all (as opposed to rejecting the operation).
    pub fn is_unavailable(&self) -> bool {
        matches!(self, StoreError::Connection(_) | StoreError::Timeout(_))
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
