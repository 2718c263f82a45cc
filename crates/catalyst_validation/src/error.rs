//! Error types for the validation pipeline.
//!
//! Invalid deployments are not errors: rules report them as messages.
//! The types here describe the pipeline failing to reach a verdict.

use thiserror::Error;

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// A side-effecting collaborator call failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("external call {call} failed: {message}")]
pub struct ExternalCallError {
    /// Name of the call that failed.
    pub call: &'static str,
    /// Error message.
    pub message: String,
}

impl ExternalCallError {
    /// Creates an external call error.
    pub fn new(call: &'static str, message: impl Into<String>) -> Self {
        Self {
            call,
            message: message.into(),
        }
    }
}

/// Errors that stop the pipeline from producing a verdict.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A rule could not complete because an external call failed.
    #[error("rule {rule} could not complete: {source}")]
    ExternalCall {
        /// Rule being evaluated.
        rule: &'static str,
        /// Underlying failure.
        source: ExternalCallError,
    },
}

impl ValidationError {
    /// Returns true if retrying later may produce a verdict.
    pub fn is_transient(&self) -> bool {
        match self {
            ValidationError::ExternalCall { .. } => true,
        }
    }
}
