//! The data access facade.

use std::fmt;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use sqlpool::{Pool, PoolStatus, PooledConnection};
use sqlpool_driver::{
    Connection, ConnectionTarget, Driver, IsolationLevel, NamedParam, ResultSet, SqlValue,
};

use crate::config::DataAccessConfig;
use crate::error::{Error, Result};
use crate::transaction::Transaction;

enum Mode {
    Pooled(Pool),
    Direct,
}

/// Runs statements against a backing store, either through a connection
/// pool or on a private connection per operation.
///
/// The mode is fixed at construction by
/// [`use_connection_pool`](DataAccessConfig::use_connection_pool). In direct
/// mode no pool is ever created and [`transaction`](DataAccess::transaction)
/// is rejected.
///
/// # Example
///
/// ```rust,ignore
/// let db = DataAccess::new(driver, DataAccessConfig::new("Server=db;Database=app")).await?;
///
/// let count = db.scalar("SELECT COUNT(*) FROM users", &[]).await?;
///
/// db.transaction(|tx| {
///     Box::pin(async move {
///         tx.execute("UPDATE accounts SET balance = balance - 10 WHERE id = 1", &[]).await?;
///         tx.execute("UPDATE accounts SET balance = balance + 10 WHERE id = 2", &[]).await?;
///         Ok(())
///     })
/// })
/// .await?;
///
/// db.dispose().await;
/// ```
pub struct DataAccess {
    driver: Arc<dyn Driver>,
    target: ConnectionTarget,
    config: DataAccessConfig,
    mode: Mode,
}

impl fmt::Debug for DataAccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataAccess")
            .field("driver", &self.driver.name())
            .field("target", &self.target)
            .field("pooled", &self.is_pooled())
            .finish_non_exhaustive()
    }
}

/// A connection held for the duration of one operation.
enum Lease {
    Pooled(PooledConnection),
    Direct(Box<dyn Connection>),
}

impl Lease {
    fn conn(&mut self) -> &mut dyn Connection {
        match self {
            Self::Pooled(conn) => &mut **conn,
            Self::Direct(conn) => conn.as_mut(),
        }
    }

    async fn finish(self) {
        match self {
            Self::Pooled(conn) => conn.release().await,
            Self::Direct(mut conn) => {
                if let Err(e) = conn.close().await {
                    tracing::debug!(error = %e, "error while closing direct connection");
                }
            }
        }
    }
}

impl DataAccess {
    /// Create a data access object.
    ///
    /// In pooled mode this creates the pool, which pre-opens
    /// `min_pool_size` connections.
    ///
    /// # Errors
    ///
    /// [`Error::Configuration`] for an empty or unparseable target or
    /// invalid pool sizes; [`Error::ConnectionFailed`] if the pool cannot
    /// pre-open its connections.
    pub async fn new<D: Driver>(driver: D, config: DataAccessConfig) -> Result<Self> {
        Self::with_driver(Arc::new(driver), config).await
    }

    /// Create a data access object over a shared driver.
    pub async fn with_driver(driver: Arc<dyn Driver>, config: DataAccessConfig) -> Result<Self> {
        config.validate()?;
        let target = ConnectionTarget::parse(&config.connection_target)
            .map_err(|e| Error::Configuration(e.to_string()))?;

        let mode = if config.use_connection_pool {
            let pool = Pool::new(Arc::clone(&driver), target.clone(), config.pool_config()).await?;
            Mode::Pooled(pool)
        } else {
            Mode::Direct
        };

        tracing::info!(
            driver = driver.name(),
            endpoint = %target,
            pooled = config.use_connection_pool,
            "data access ready"
        );

        Ok(Self {
            driver,
            target,
            config,
            mode,
        })
    }

    /// Create a data access object from a connection string that may carry
    /// pooling keywords. See [`DataAccessConfig::from_connection_string`].
    pub async fn from_connection_string<D: Driver>(driver: D, conn_str: &str) -> Result<Self> {
        let config = DataAccessConfig::from_connection_string(conn_str)?;
        Self::new(driver, config).await
    }

    /// Check if operations go through a connection pool.
    #[must_use]
    pub fn is_pooled(&self) -> bool {
        matches!(self.mode, Mode::Pooled(_))
    }

    /// Current pool status, or `None` in direct mode.
    #[must_use]
    pub fn pool_status(&self) -> Option<PoolStatus> {
        match &self.mode {
            Mode::Pooled(pool) => Some(pool.status()),
            Mode::Direct => None,
        }
    }

    /// The underlying pool, or `None` in direct mode.
    #[must_use]
    pub fn pool(&self) -> Option<&Pool> {
        match &self.mode {
            Mode::Pooled(pool) => Some(pool),
            Mode::Direct => None,
        }
    }

    /// The configuration this object was created with.
    #[must_use]
    pub fn config(&self) -> &DataAccessConfig {
        &self.config
    }

    async fn lease(&self) -> Result<Lease> {
        match &self.mode {
            Mode::Pooled(pool) => Ok(Lease::Pooled(pool.acquire().await?)),
            Mode::Direct => {
                let conn = self
                    .driver
                    .connect(&self.target)
                    .await
                    .map_err(Error::ConnectionFailed)?;
                Ok(Lease::Direct(conn))
            }
        }
    }

    /// Run a statement that returns rows.
    pub async fn query(&self, sql: &str, params: &[NamedParam]) -> Result<ResultSet> {
        let mut lease = self.lease().await?;
        let result = lease.conn().query(sql, params).await;
        lease.finish().await;
        result.map_err(Error::statement)
    }

    /// Run a statement and return the number of affected rows.
    pub async fn execute(&self, sql: &str, params: &[NamedParam]) -> Result<u64> {
        let mut lease = self.lease().await?;
        let result = lease.conn().execute(sql, params).await;
        lease.finish().await;
        result.map_err(Error::statement)
    }

    /// Run a statement and return the first column of the first row, or
    /// `None` when it returns no rows.
    pub async fn scalar(&self, sql: &str, params: &[NamedParam]) -> Result<Option<SqlValue>> {
        let mut lease = self.lease().await?;
        let result = lease.conn().scalar(sql, params).await;
        lease.finish().await;
        result.map_err(Error::statement)
    }

    /// Run a unit of work in a transaction at the default isolation level.
    ///
    /// See [`transaction_with`](DataAccess::transaction_with).
    pub async fn transaction<T, F>(&self, work: F) -> Result<T>
    where
        F: for<'t> FnOnce(&'t mut Transaction) -> BoxFuture<'t, Result<T>>,
    {
        self.transaction_with(IsolationLevel::default(), work).await
    }

    /// Run a unit of work in a transaction on a single pooled connection.
    ///
    /// Commits when the unit of work succeeds. On failure the transaction is
    /// rolled back and the original error returned; a rollback failure is
    /// attached as [`Error::rollback_error`]. The connection goes back to the
    /// pool after a successful commit or rollback; otherwise it is closed.
    /// The same holds if this future is dropped or the unit of work panics.
    ///
    /// # Errors
    ///
    /// [`Error::UnsupportedOperation`] in direct mode, acquisition errors
    /// unchanged, or the unit of work's error.
    pub async fn transaction_with<T, F>(&self, isolation: IsolationLevel, work: F) -> Result<T>
    where
        F: for<'t> FnOnce(&'t mut Transaction) -> BoxFuture<'t, Result<T>>,
    {
        let Mode::Pooled(pool) = &self.mode else {
            return Err(Error::UnsupportedOperation(
                "transactions require connection pooling".into(),
            ));
        };

        let conn = pool.acquire().await?;
        let mut tx = Transaction::new(conn, isolation);

        let result = match tx.begin().await {
            Err(e) => Err(Error::statement(e)),
            Ok(()) => match work(&mut tx).await {
                Ok(value) => tx.commit().await.map(|()| value).map_err(Error::statement),
                Err(err) => Err(tx.rollback_after(err).await),
            },
        };

        tx.into_connection().release().await;
        result
    }

    /// Dispose the pool, if any.
    ///
    /// Safe to call more than once and on an object that was never used.
    pub async fn dispose(&self) {
        if let Mode::Pooled(pool) = &self.mode {
            pool.dispose().await;
        }
    }
}
