//! Error taxonomy for the sync pipeline.
//!
//! Every phase of a run returns [`SyncError`]; the orchestrator turns it into a
//! single log line and a terminal [`crate::synchronise::SyncOutcome`].

use thiserror::Error;

/// Result type for pipeline operations.
pub type SyncResult<T> = Result<T, SyncError>;

#[derive(Error, Debug)]
pub enum SyncError {
    /// The push context is incomplete. Carries the human-readable report.
    #[error("invalid context: {0}")]
    Validation(String),

    /// The platform answered with a non-success HTTP status.
    #[error("remote error (HTTP {status}): {body}")]
    Remote { status: u16, body: String },

    /// The request never produced an HTTP response (DNS, TLS, connection reset).
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Success status, but the body does not match the expected schema.
    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("job cancelled")]
    Cancelled,

    #[error("export job failed")]
    ExportJobFailed,

    #[error("push failed: {0}")]
    PushFailed(String),

    /// A run is already in flight on this orchestrator.
    #[error("a sync run is already active")]
    AlreadyRunning,
}

impl SyncError {
    /// Cancellation ends a run without counting as a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, SyncError::Cancelled)
    }
}

impl From<zip::result::ZipError> for SyncError {
    fn from(e: zip::result::ZipError) -> Self {
        match e {
            zip::result::ZipError::Io(io) => SyncError::Io(io),
            other => SyncError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                other.to_string(),
            )),
        }
    }
}
