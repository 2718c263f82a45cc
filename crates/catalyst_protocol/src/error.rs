//! Error types for the protocol crate.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while parsing or encoding protocol values.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// An entity type string that the node does not know.
    #[error("unknown entity type: {0}")]
    UnknownEntityType(String),

    /// An entity version string that the node does not know.
    #[error("unknown entity version: {0}")]
    UnknownEntityVersion(String),

    /// A request could not be parsed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// JSON encoding or decoding failed.
    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = ProtocolError::UnknownEntityType("store".into());
        assert_eq!(err.to_string(), "unknown entity type: store");
    }
}
