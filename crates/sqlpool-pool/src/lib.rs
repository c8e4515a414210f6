//! # sqlpool
//!
//! Bounded async connection pool with background maintenance.
//!
//! The pool is generic over a [`Driver`](sqlpool_driver::Driver): it never
//! speaks a wire protocol itself, it only opens, checks and closes the
//! connections the driver hands it.
//!
//! ## Features
//!
//! - Hard upper bound on connections, including those still being opened
//! - `min_connections` pre-opened at creation and topped up in the background
//! - Idle connections that report closed are reopened or discarded
//! - Cancellable acquisition with an optional timeout
//! - Graceful disposal that wakes every waiter and closes idle connections
//!
//! ## Example
//!
//! ```rust,ignore
//! use sqlpool::{Pool, PoolConfig};
//!
//! let pool = Pool::builder()
//!     .driver(my_driver)
//!     .target("Server=db.internal;Database=app;User Id=svc")
//!     .min_connections(2)
//!     .max_connections(20)
//!     .build()
//!     .await?;
//!
//! let mut conn = pool.acquire().await?;
//! let rows = conn.query("SELECT 1", &[]).await?;
//! // Connection automatically returned to pool on drop
//!
//! pool.dispose().await;
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod config;
pub mod error;
pub mod lifecycle;
pub mod pool;

pub use config::PoolConfig;
pub use error::PoolError;
pub use lifecycle::{ConnectionMetadata, ConnectionState, MaintenanceReport};
pub use pool::{Pool, PoolBuilder, PoolStatus, PooledConnection};
pub use tokio_util::sync::CancellationToken;
