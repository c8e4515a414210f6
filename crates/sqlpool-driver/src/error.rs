//! Driver error types.

use thiserror::Error;

/// Errors reported by a driver's connection primitive.
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum DriverError {
    /// The backing store could not be reached.
    #[error("connect failed: {0}")]
    Connect(String),

    /// The backing store rejected the credentials.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// The connection is not open.
    #[error("connection closed")]
    ConnectionClosed,

    /// The backing store rejected a statement or its parameters.
    #[error("statement error {code}: {message}")]
    Statement {
        /// Driver-specific error code.
        code: i32,
        /// Error message from the backing store.
        message: String,
    },

    /// Transaction control failed (begin, commit or rollback).
    #[error("transaction error: {0}")]
    Transaction(String),

    /// The connection target could not be understood.
    #[error("configuration error: {0}")]
    Config(String),
}

impl DriverError {
    /// Create a statement error.
    pub fn statement(code: i32, message: impl Into<String>) -> Self {
        Self::Statement {
            code,
            message: message.into(),
        }
    }

    /// Check if this error means the connection itself is unusable.
    ///
    /// Statement and transaction errors leave the connection usable; connect,
    /// authentication and closed-connection errors do not.
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connect(_) | Self::Authentication(_) | Self::ConnectionClosed
        )
    }

    /// Get the driver error code if this is a statement error.
    #[must_use]
    pub fn code(&self) -> Option<i32> {
        match self {
            Self::Statement { code, .. } => Some(*code),
            _ => None,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_error_classification() {
        assert!(DriverError::Connect("refused".into()).is_connection_error());
        assert!(DriverError::Authentication("bad password".into()).is_connection_error());
        assert!(DriverError::ConnectionClosed.is_connection_error());
        assert!(!DriverError::statement(208, "invalid object name").is_connection_error());
        assert!(!DriverError::Transaction("no active transaction".into()).is_connection_error());
    }

    #[test]
    fn test_statement_error_display() {
        let err = DriverError::statement(2627, "duplicate key");
        assert_eq!(err.to_string(), "statement error 2627: duplicate key");
        assert_eq!(err.code(), Some(2627));
        assert_eq!(DriverError::ConnectionClosed.code(), None);
    }
}
