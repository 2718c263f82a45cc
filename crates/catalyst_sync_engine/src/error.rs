//! Error types for the sync engine.

use catalyst_protocol::ProtocolError;
use catalyst_validation::ValidationError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during synchronization.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// A peer answered with something that is not a valid response.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// No peer list could be obtained.
    #[error("cluster unreachable: {0}")]
    ClusterUnreachable(String),

    /// Applying a deployment locally failed.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// Reading or writing a system property failed.
    #[error("property store error: {0}")]
    PropertyStore(String),

    /// Validation could not reach a verdict.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Encoding or decoding failed.
    #[error("codec error: {0}")]
    Codec(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The cluster is not connected.
    #[error("not connected to the cluster")]
    NotConnected,
}

impl SyncError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if the next sync round may succeed where this one failed.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Transport { retryable, .. } => *retryable,
            SyncError::ClusterUnreachable(_) | SyncError::NotConnected => true,
            SyncError::Validation(e) => e.is_transient(),
            _ => false,
        }
    }
}

impl From<ProtocolError> for SyncError {
    fn from(err: ProtocolError) -> Self {
        SyncError::Codec(err.to_string())
    }
}
