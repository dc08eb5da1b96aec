use thiserror::Error;

use crate::types::SensorKind;

/// Telemetry pipeline error types
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TelemetryError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("I/O failure: {0}")]
    IoFailure(String),

    #[error("No {0} sensor available on this device")]
    SensorUnavailable(SensorKind),

    #[error("Storage permission denied")]
    PermissionDenied,

    #[error("Pipeline already running")]
    AlreadyRunning,

    #[error("Pipeline not running")]
    NotRunning,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<std::io::Error> for TelemetryError {
    fn from(err: std::io::Error) -> Self {
        TelemetryError::IoFailure(err.to_string())
    }
}

/// Result type for pipeline operations
pub type TelemetryResult<T> = Result<T, TelemetryError>;

/// Map a poisoned lock into an `Internal` error naming the lock.
pub(crate) fn poisoned<E>(what: &str) -> impl FnOnce(E) -> TelemetryError + '_ {
    move |_| TelemetryError::Internal(format!("Failed to acquire {} lock", what))
}
