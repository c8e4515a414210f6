//! # sqlpool-access
//!
//! Data access facade over the [`sqlpool`] connection pool.
//!
//! [`DataAccess`] runs `query`, `execute` and `scalar` against a backing
//! store and wraps units of work in transactions. It either borrows a
//! connection from a pool for each operation (the default) or, with pooling
//! disabled, opens and closes a private connection per operation.
//!
//! ## Example
//!
//! ```rust,ignore
//! use sqlpool_access::{DataAccess, DataAccessConfig};
//! use sqlpool_driver::NamedParam;
//!
//! let db = DataAccess::from_connection_string(
//!     my_driver,
//!     "Server=db.internal;Database=app;User Id=svc;Max Pool Size=20",
//! )
//! .await?;
//!
//! let name = db
//!     .scalar("SELECT name FROM users WHERE id = @id", &[NamedParam::new("id", 42)])
//!     .await?;
//!
//! db.dispose().await;
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod access;
pub mod config;
pub mod error;
pub mod transaction;

pub use access::DataAccess;
pub use config::DataAccessConfig;
pub use error::{Error, Result};
pub use transaction::Transaction;

pub use futures_util::future::BoxFuture;
pub use sqlpool::{PoolStatus, PooledConnection};
pub use sqlpool_driver::{IsolationLevel, NamedParam, ResultSet, Row, SqlValue};
