//! Error types for the node store.

/// Errors returned by [`NodeStore`](crate::NodeStore) operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// SQLite error.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}
