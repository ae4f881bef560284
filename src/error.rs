//! Error types for the reconciliation engine and its persistence layer.

use thiserror::Error;

/// Result type for persistence operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised by a [`crate::store::CatalogStore`] implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// An insert collided with an identity that is already persisted.
    #[error("package identity already exists: {0}")]
    DuplicateIdentity(String),

    /// A stored value could not be turned back into a domain value.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Membership was written for a collection that does not exist.
    #[error("collection not found: {0}")]
    CollectionNotFound(i64),

    /// A blocking database task panicked or was cancelled.
    #[error("database task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// IO error (file system).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that terminate one phase of a reconciliation pass.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// One of the external list fetches failed (network, decode, auth).
    #[error("failed to fetch {list}: {source}")]
    Fetch {
        list: &'static str,
        #[source]
        source: anyhow::Error,
    },

    /// Writing to or reading from the backing store failed.
    #[error("persistence failure: {0}")]
    Persistence(#[from] StoreError),
}

impl ReconcileError {
    pub(crate) fn fetch(list: &'static str, source: anyhow::Error) -> Self {
        Self::Fetch { list, source }
    }
}
