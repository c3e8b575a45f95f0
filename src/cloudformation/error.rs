//! Error types for the CloudFormation backend.

use thiserror::Error;

use crate::backend::BackendError;
use crate::tunnel::SpawnError;

/// Errors raised by the CloudFormation backend.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum CloudFormationError {
    /// Raised when a request is missing a required field.
    #[error("invalid create request: {0}")]
    Validation(String),
    /// Raised when the provider CLI cannot be started.
    #[error(transparent)]
    Spawn(#[from] SpawnError),
    /// Raised when the provider CLI reports a failure.
    #[error("aws {operation} failed (status {status_text}): {stderr}")]
    Api {
        /// CLI operation that failed.
        operation: String,
        /// Exit status of the CLI process, as text.
        status_text: String,
        /// Stderr captured from the CLI.
        stderr: String,
    },
    /// Raised when a CLI response cannot be decoded.
    #[error("unexpected aws {operation} response: {message}")]
    Payload {
        /// CLI operation whose output was malformed.
        operation: String,
        /// Decoding failure description.
        message: String,
    },
    /// Raised when stack creation reaches a state it cannot recover from.
    #[error("stack {stack_id} failed to create (status {status}): {reason}")]
    CreateFailed {
        /// Stack identifier.
        stack_id: String,
        /// Terminal status reported by the provider.
        status: String,
        /// Status reason, when the provider supplied one.
        reason: String,
    },
    /// Raised when the stack does not become ready within the wait budget.
    #[error("timed out waiting for stack {stack_id} to complete")]
    Timeout {
        /// Stack identifier.
        stack_id: String,
    },
}

impl From<BackendError> for CloudFormationError {
    fn from(value: BackendError) -> Self {
        match value {
            BackendError::Validation(field) => Self::Validation(field),
        }
    }
}
