//! The error taxonomy surfaced to the external layer.

use postern_driver::DriverError;
use postern_store::StoreError;
use postern_types::InvalidTokenError;

/// Errors returned by [`Daemon`](crate::Daemon) and [`State`](crate::State)
/// operations. This is the closed set the HTTP layer maps to status codes;
/// driver errors propagate through untranslated.
#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    /// No node is registered under the given label.
    #[error("no such node")]
    NoSuchNode,

    /// The presented token does not match the node's current token.
    #[error("invalid token")]
    InvalidToken,

    /// A node with this label is already registered.
    #[error("node already exists: {0}")]
    NodeExists(String),

    /// The expected version did not match; `current` is the node's actual
    /// version.
    #[error("version conflict: current version is {current}")]
    VersionConflict {
        /// The node's current version.
        current: u64,
    },

    /// An error from the driver layer.
    #[error(transparent)]
    Driver(#[from] DriverError),

    /// An error from the persistence layer.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<InvalidTokenError> for DaemonError {
    fn from(_: InvalidTokenError) -> Self {
        Self::InvalidToken
    }
}
