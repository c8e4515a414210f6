//! Transaction handle.

use sqlpool::PooledConnection;
use sqlpool_driver::{DriverError, IsolationLevel, NamedParam, ResultSet, SqlValue};

use crate::error::{Error, Result};

/// A transaction running on one pooled connection.
///
/// Handed to the unit of work passed to
/// [`DataAccess::transaction`](crate::DataAccess::transaction). Every
/// statement runs on the same connection, in submission order. Commit and
/// rollback are driven by the outcome of the unit of work, not called
/// directly.
///
/// From `begin` until a successful commit or rollback the connection is
/// marked not reusable. If the transaction is abandoned in between (the
/// future is dropped, the unit of work panics, or commit or rollback fail)
/// the connection is closed on return instead of going back to the idle set.
#[derive(Debug)]
pub struct Transaction {
    conn: PooledConnection,
    isolation: IsolationLevel,
    statements: u64,
}

impl Transaction {
    pub(crate) fn new(conn: PooledConnection, isolation: IsolationLevel) -> Self {
        Self {
            conn,
            isolation,
            statements: 0,
        }
    }

    pub(crate) async fn begin(&mut self) -> std::result::Result<(), DriverError> {
        self.conn.set_reusable(false);
        self.conn.begin(self.isolation).await?;
        tracing::debug!(
            conn_id = self.conn.metadata().id,
            isolation = %self.isolation,
            "transaction started"
        );
        Ok(())
    }

    /// The isolation level the transaction was started with.
    #[must_use]
    pub fn isolation_level(&self) -> IsolationLevel {
        self.isolation
    }

    /// Number of statements submitted so far.
    #[must_use]
    pub fn statement_count(&self) -> u64 {
        self.statements
    }

    /// Run a statement that returns rows.
    pub async fn query(&mut self, sql: &str, params: &[NamedParam]) -> Result<ResultSet> {
        self.statements += 1;
        self.conn.query(sql, params).await.map_err(Error::statement)
    }

    /// Run a statement and return the number of affected rows.
    pub async fn execute(&mut self, sql: &str, params: &[NamedParam]) -> Result<u64> {
        self.statements += 1;
        self.conn.execute(sql, params).await.map_err(Error::statement)
    }

    /// Run a statement and return the first column of the first row.
    pub async fn scalar(&mut self, sql: &str, params: &[NamedParam]) -> Result<Option<SqlValue>> {
        self.statements += 1;
        self.conn.scalar(sql, params).await.map_err(Error::statement)
    }

    pub(crate) async fn commit(&mut self) -> std::result::Result<(), DriverError> {
        self.conn.commit().await?;
        self.conn.set_reusable(true);
        tracing::debug!(
            conn_id = self.conn.metadata().id,
            statements = self.statements,
            "transaction committed"
        );
        Ok(())
    }

    /// Roll back after `err` and fold any rollback failure into it.
    pub(crate) async fn rollback_after(&mut self, err: Error) -> Error {
        let conn_id = self.conn.metadata().id;
        match self.conn.rollback().await {
            Ok(()) => {
                self.conn.set_reusable(true);
                tracing::debug!(conn_id, error = %err, "transaction rolled back");
                err
            }
            Err(rollback) => match err {
                Error::Statement {
                    source,
                    rollback_error: None,
                } => {
                    tracing::warn!(conn_id, error = %rollback, "rollback failed");
                    Error::Statement {
                        source,
                        rollback_error: Some(rollback),
                    }
                }
                other => {
                    tracing::error!(
                        conn_id,
                        error = %other,
                        rollback_error = %rollback,
                        "rollback failed"
                    );
                    other
                }
            },
        }
    }

    pub(crate) fn into_connection(self) -> PooledConnection {
        self.conn
    }
}
