//! Pool error types.

use std::time::Duration;

use sqlpool_driver::DriverError;
use thiserror::Error;

/// Errors that can occur during pool operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PoolError {
    /// The pool has been disposed.
    #[error("pool is closed")]
    PoolClosed,

    /// A new connection could not be opened.
    #[error("failed to open connection: {0}")]
    ConnectionFailed(#[source] DriverError),

    /// The caller cancelled the acquire while it waited for a permit.
    #[error("connection acquisition cancelled")]
    Cancelled,

    /// No permit became available within the configured acquire timeout.
    #[error("connection acquisition timeout after {0:?}")]
    AcquisitionTimeout(Duration),

    /// The call itself was malformed.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Pool configuration error.
    #[error("pool configuration error: {0}")]
    Configuration(String),
}
