//! HTTP error responses.

use axum::Json;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use postern_core::DaemonError;
use postern_driver::DriverError;
use serde::Serialize;
use tracing::error;

/// Errors returned by API handlers.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// An error from the daemon, mapped to a status code below.
    #[error(transparent)]
    Daemon(#[from] DaemonError),

    /// The request body did not parse.
    #[error("malformed request: {0}")]
    MalformedRequest(String),
}

/// Body of a 409 response: the node's actual version.
#[derive(Serialize)]
struct VersionConflictBody {
    version: u64,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        match self {
            Self::Daemon(DaemonError::NoSuchNode) => StatusCode::NOT_FOUND.into_response(),
            Self::Daemon(DaemonError::InvalidToken) => StatusCode::UNAUTHORIZED.into_response(),
            Self::Daemon(DaemonError::VersionConflict { current }) => (
                StatusCode::CONFLICT,
                Json(VersionConflictBody { version: current }),
            )
                .into_response(),
            Self::Daemon(DaemonError::Driver(DriverError::InvalidBootdev(_))) => {
                StatusCode::BAD_REQUEST.into_response()
            }
            // A malformed ConnInfo envelope is a malformed request body.
            Self::Daemon(DaemonError::Driver(DriverError::MalformedInfo(_))) => {
                StatusCode::BAD_REQUEST.into_response()
            }
            Self::MalformedRequest(_) => StatusCode::BAD_REQUEST.into_response(),
            Self::Daemon(e) => {
                // UnknownType, subprocess and SQL failures, NodeExists (which
                // set_node's re-register semantic never actually surfaces).
                error!(%e, "internal error handling request");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }
}
