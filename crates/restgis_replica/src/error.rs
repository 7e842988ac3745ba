//! Error types for the replica workflow.

use restgis_core::ServiceError;
use thiserror::Error;

/// Result type for replica operations.
pub type ReplicaResult<T> = Result<T, ReplicaError>;

/// Errors that can occur while creating or managing replicas.
#[derive(Error, Debug)]
pub enum ReplicaError {
    /// Error reported by the service layer.
    #[error(transparent)]
    Service(#[from] ServiceError),

    /// The workflow was cancelled through its [`CancelHandle`](crate::CancelHandle).
    #[error("replica workflow cancelled")]
    Cancelled,

    /// The asynchronous create job did not finish within the poll limits.
    #[error("replica job still running after {attempts} status checks")]
    Timeout {
        /// Status checks performed.
        attempts: u32,
    },

    /// Invalid state transition.
    #[error("invalid state transition from {from:?} to {to:?}")]
    InvalidStateTransition {
        /// Current state.
        from: String,
        /// Attempted target state.
        to: String,
    },
}

impl ReplicaError {
    /// Creates an unsupported-operation error.
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::Service(ServiceError::UnsupportedOperation(message.into()))
    }

    /// Creates a remote error without a code.
    pub fn remote(message: impl Into<String>) -> Self {
        Self::Service(ServiceError::remote(message))
    }

    /// Returns true if this error can be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            ReplicaError::Service(e) => e.is_retryable(),
            ReplicaError::Timeout { .. } => true,
            _ => false,
        }
    }

    /// The service error behind this error, if any.
    pub fn service_error(&self) -> Option<&ServiceError> {
        match self {
            ReplicaError::Service(e) => Some(e),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors() {
        assert!(ReplicaError::from(ServiceError::transport_retryable("reset")).is_retryable());
        assert!(ReplicaError::Timeout { attempts: 3 }.is_retryable());
        assert!(!ReplicaError::Cancelled.is_retryable());
        assert!(!ReplicaError::unsupported("sync").is_retryable());
    }

    #[test]
    fn service_errors_display_transparently() {
        let err = ReplicaError::remote("replica job failed");
        assert_eq!(err.to_string(), "remote error 0: replica job failed");
        assert!(matches!(
            err.service_error(),
            Some(ServiceError::RemoteError { .. })
        ));
    }
}
