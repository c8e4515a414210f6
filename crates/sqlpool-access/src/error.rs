//! Data access error types.

use std::time::Duration;

use sqlpool::PoolError;
use sqlpool_driver::DriverError;
use thiserror::Error;

/// Errors returned by [`DataAccess`](crate::DataAccess).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Invalid construction parameters.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A connection to the backing store could not be opened.
    #[error("failed to open connection: {0}")]
    ConnectionFailed(#[source] DriverError),

    /// The pool was disposed.
    #[error("pool is closed")]
    PoolClosed,

    /// The operation is not available in the current mode.
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// A statement failed.
    ///
    /// Inside a transaction, `rollback_error` carries the failure of the
    /// rollback that followed, if any.
    #[error("statement failed: {source}")]
    Statement {
        /// The statement failure.
        #[source]
        source: DriverError,
        /// Failure of the rollback attempted afterwards.
        rollback_error: Option<DriverError>,
    },

    /// Acquisition was cancelled while waiting for a connection.
    #[error("connection acquisition cancelled")]
    Cancelled,

    /// No connection became available within the acquire timeout.
    #[error("connection acquisition timeout after {0:?}")]
    AcquisitionTimeout(Duration),

    /// A malformed call.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Any other pool error.
    #[error(transparent)]
    Pool(PoolError),
}

impl Error {
    /// Wrap a driver failure that happened while running a statement.
    pub(crate) fn statement(source: DriverError) -> Self {
        Self::Statement {
            source,
            rollback_error: None,
        }
    }

    /// Check if this error is transient and may succeed on retry.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::ConnectionFailed(_) | Self::AcquisitionTimeout(_) => true,
            Self::Statement { source, .. } => source.is_connection_error(),
            _ => false,
        }
    }

    /// The rollback failure recorded alongside a statement failure.
    #[must_use]
    pub fn rollback_error(&self) -> Option<&DriverError> {
        match self {
            Self::Statement { rollback_error, .. } => rollback_error.as_ref(),
            _ => None,
        }
    }

    /// The driver error behind this error, if any.
    #[must_use]
    pub fn driver_error(&self) -> Option<&DriverError> {
        match self {
            Self::ConnectionFailed(e) | Self::Statement { source: e, .. } => Some(e),
            _ => None,
        }
    }
}

impl From<PoolError> for Error {
    fn from(e: PoolError) -> Self {
        match e {
            PoolError::PoolClosed => Self::PoolClosed,
            PoolError::ConnectionFailed(e) => Self::ConnectionFailed(e),
            PoolError::Cancelled => Self::Cancelled,
            PoolError::AcquisitionTimeout(d) => Self::AcquisitionTimeout(d),
            PoolError::InvalidArgument(msg) => Self::InvalidArgument(msg),
            PoolError::Configuration(msg) => Self::Configuration(msg),
            other => Self::Pool(other),
        }
    }
}

/// Result type for data access operations.
pub type Result<T> = std::result::Result<T, Error>;
