//! # sqlpool-driver
//!
//! The seam between `sqlpool` and the database driver that actually speaks
//! the network protocol.
//!
//! The pool treats connections as opaque. Everything it needs from a driver
//! is captured by two traits:
//!
//! - [`Driver`] creates unopened connections for a [`ConnectionTarget`].
//! - [`Connection`] opens, reports liveness, closes, runs statements and
//!   scopes transactions to itself.
//!
//! The value, row and parameter types that cross this seam also live here so
//! that the pool, the data-access layer and driver implementations agree on
//! them.
//!
//! ## Example
//!
//! ```rust,ignore
//! use sqlpool_driver::{ConnectionTarget, Driver, NamedParam};
//!
//! let target = ConnectionTarget::parse("Server=db.internal;Database=app;User Id=svc")?;
//! let mut conn = driver.connect(&target).await?;
//! let rows = conn
//!     .query("SELECT name FROM users WHERE id = @id", &[NamedParam::new("id", 7)])
//!     .await?;
//! conn.close().await?;
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod connection;
pub mod error;
pub mod params;
pub mod row;
pub mod target;
pub mod transaction;
pub mod value;

pub use connection::{Connection, Driver};
pub use error::DriverError;
pub use params::NamedParam;
pub use row::{Column, ResultSet, Row};
pub use target::ConnectionTarget;
pub use transaction::IsolationLevel;
pub use value::SqlValue;
