//! Error types for the driver layer.

/// Errors returned by drivers and the per-node coordinator.
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    /// The ConnInfo envelope named a driver type that is not registered.
    #[error("unknown obm type: {0}")]
    UnknownType(String),

    /// The driver-specific payload did not parse.
    #[error("malformed driver info: {0}")]
    MalformedInfo(#[from] serde_json::Error),

    /// The requested boot device is not valid for this driver.
    #[error("invalid boot device: {0}")]
    InvalidBootdev(String),

    /// The coordinator has been cancelled; no further operations are served.
    #[error("obm is shut down")]
    Canceled,

    /// I/O failure launching or talking to a subprocess or connection.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A control-plane subprocess ran but exited unsuccessfully.
    #[error("command failed: {0}")]
    CommandFailed(String),
}
