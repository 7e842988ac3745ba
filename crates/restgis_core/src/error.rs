//! Error types for service access.

use thiserror::Error;

/// Result type for service operations.
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Errors that can occur while talking to a feature service or reading its data.
#[derive(Error, Debug)]
pub enum ServiceError {
    /// The target service or layer does not declare the requested capability.
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// The service answered with an explicit error payload.
    #[error("remote error {code}: {message}")]
    RemoteError {
        /// Error code reported by the service (0 when absent).
        code: i64,
        /// Error message reported by the service.
        message: String,
        /// Additional detail lines.
        details: Vec<String>,
    },

    /// A layer name or id could not be resolved to an endpoint.
    #[error("resource not found: {0}")]
    MissingResource(String),

    /// Random row access beyond the available rows.
    #[error("row index {index} out of range for {len} rows")]
    IndexOutOfRange {
        /// Requested index.
        index: usize,
        /// Number of rows available.
        len: usize,
    },

    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the request can be retried.
        retryable: bool,
    },

    /// A response did not have the expected structure.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A geometry input could not be interpreted.
    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),

    /// A row exporter could not write its target.
    #[error("export to {target} failed: {message}")]
    Export {
        /// Export target.
        target: String,
        /// Failure text.
        message: String,
    },

    /// JSON encoding or decoding failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ServiceError {
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

    /// Creates a remote error without a code or details.
    pub fn remote(message: impl Into<String>) -> Self {
        Self::RemoteError {
            code: 0,
            message: message.into(),
            details: Vec::new(),
        }
    }

    /// Returns true if this error can be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            ServiceError::Transport { retryable, .. } => *retryable,
            // 5xx-style codes are transient on ArcGIS servers
            ServiceError::RemoteError { code, .. } => (500..600).contains(code),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors() {
        assert!(ServiceError::transport_retryable("connection reset").is_retryable());
        assert!(!ServiceError::transport_fatal("bad certificate").is_retryable());
        assert!(!ServiceError::UnsupportedOperation("sync".into()).is_retryable());

        let busy = ServiceError::RemoteError {
            code: 503,
            message: "busy".into(),
            details: vec![],
        };
        assert!(busy.is_retryable());
        assert!(!ServiceError::remote("Invalid token").is_retryable());
    }

    #[test]
    fn error_display() {
        let err = ServiceError::IndexOutOfRange { index: 7, len: 3 };
        assert_eq!(err.to_string(), "row index 7 out of range for 3 rows");

        let err = ServiceError::RemoteError {
            code: 400,
            message: "Unable to complete operation.".into(),
            details: vec!["Invalid layer".into()],
        };
        assert!(err.to_string().contains("400"));
        assert!(err.to_string().contains("Unable to complete"));
    }
}
