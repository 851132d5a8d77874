//! Error types for synchronized collections

use thiserror::Error;

use crate::record::RecordStatus;

/// Result type for store operations
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors surfaced to callers of the store and command handlers.
///
/// Remote failures never appear here on their own: they are absorbed into a
/// switch to local mode. They only show up as context on a `Persistence`
/// error when the local write that replaced them failed too.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Record or file rejected before anything was written
    #[error("Validation error: {0}")]
    Validation(String),

    /// No record with this id in the current view
    #[error("Record not found: {0}")]
    NotFound(String),

    /// Status change not allowed from the record's current status
    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition { from: RecordStatus, to: RecordStatus },

    /// Incoming data could not be mapped onto the record schema
    #[error("Normalization error: {0}")]
    Normalization(String),

    /// Local durable storage failed (after any remote fallback)
    #[error("Persistence error: {local}")]
    Persistence {
        local: String,
        remote: Option<String>,
    },
}

impl StoreError {
    pub(crate) fn persistence(local: impl ToString, remote: Option<String>) -> Self {
        StoreError::Persistence {
            local: local.to_string(),
            remote,
        }
    }

    /// Record the remote failure that preceded a local one.
    pub(crate) fn with_remote(self, remote: Option<String>) -> Self {
        match self {
            StoreError::Persistence { local, remote: None } => {
                StoreError::Persistence { local, remote }
            }
            other => other,
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Normalization(err.to_string())
    }
}
