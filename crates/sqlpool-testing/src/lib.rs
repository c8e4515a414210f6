//! # sqlpool-testing
//!
//! Test infrastructure for the sqlpool crates.
//!
//! The centerpiece is [`MockDriver`], an in-memory implementation of
//! [`sqlpool_driver::Driver`] that lets tests observe and break the backing
//! store:
//!
//! - canned responses per statement text
//! - a committed-statement log that only sees transactional writes on commit
//! - counters for opened, closed and concurrently live connections
//! - fault injection: unreachable store, failing connects, severed or dead
//!   connections, failing rollbacks, slow connects
//!
//! ## Example
//!
//! ```rust,ignore
//! use sqlpool_testing::{MockDriver, MockResponse};
//!
//! let driver = MockDriver::builder()
//!     .with_response("SELECT COUNT(*) FROM users", MockResponse::scalar(3))
//!     .build();
//!
//! let pool = sqlpool::Pool::builder()
//!     .driver(driver.clone())
//!     .target("Server=mock")
//!     .build()
//!     .await?;
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod mock_driver;

pub use mock_driver::{MockDriver, MockDriverBuilder, MockResponse};

/// A connection target accepted by [`MockDriver`].
pub const MOCK_TARGET: &str = "Server=mock;Database=test;User Id=tester";
