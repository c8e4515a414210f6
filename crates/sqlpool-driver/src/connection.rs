//! Connection primitive traits.
//!
//! These are the only operations the pool and data-access layers perform on
//! a driver. Both traits use `#[async_trait]` so they can be used as trait
//! objects (`Arc<dyn Driver>`, `Box<dyn Connection>`).

use async_trait::async_trait;

use crate::error::DriverError;
use crate::params::NamedParam;
use crate::row::ResultSet;
use crate::target::ConnectionTarget;
use crate::transaction::IsolationLevel;
use crate::value::SqlValue;

/// A single connection to the backing store.
///
/// A connection starts closed. [`open`](Connection::open) establishes it and
/// may be called again on a connection that has since dropped, which is how
/// the pool revives idle connections during maintenance.
///
/// Transactions are scoped to the connection: between
/// [`begin`](Connection::begin) and [`commit`](Connection::commit) or
/// [`rollback`](Connection::rollback) every statement on this connection
/// runs inside the transaction.
#[async_trait]
pub trait Connection: Send {
    /// Open (or reopen) the connection.
    async fn open(&mut self) -> Result<(), DriverError>;

    /// Check if the connection currently reports itself open.
    ///
    /// This is a local state check; it does not round-trip to the server.
    fn is_open(&self) -> bool;

    /// Close the connection.
    ///
    /// Closing an already closed connection is not an error.
    async fn close(&mut self) -> Result<(), DriverError>;

    /// Begin a transaction.
    async fn begin(&mut self, isolation: IsolationLevel) -> Result<(), DriverError>;

    /// Commit the current transaction.
    async fn commit(&mut self) -> Result<(), DriverError>;

    /// Roll back the current transaction.
    async fn rollback(&mut self) -> Result<(), DriverError>;

    /// Run a statement that returns rows.
    async fn query(&mut self, sql: &str, params: &[NamedParam]) -> Result<ResultSet, DriverError>;

    /// Run a statement and return the number of affected rows.
    async fn execute(&mut self, sql: &str, params: &[NamedParam]) -> Result<u64, DriverError>;

    /// Run a statement and return the first column of the first row.
    async fn scalar(
        &mut self,
        sql: &str,
        params: &[NamedParam],
    ) -> Result<Option<SqlValue>, DriverError> {
        Ok(self.query(sql, params).await?.into_scalar())
    }
}

/// A driver creates connections for a target.
#[async_trait]
pub trait Driver: Send + Sync + 'static {
    /// Short driver name, used in logs.
    fn name(&self) -> &str;

    /// Create an unopened connection for the target.
    fn connection(&self, target: &ConnectionTarget) -> Box<dyn Connection>;

    /// Create and open a connection.
    async fn connect(&self, target: &ConnectionTarget) -> Result<Box<dyn Connection>, DriverError> {
        let mut conn = self.connection(target);
        conn.open().await?;
        Ok(conn)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::row::Column;

    struct Echo {
        open: bool,
    }

    #[async_trait]
    impl Connection for Echo {
        async fn open(&mut self) -> Result<(), DriverError> {
            self.open = true;
            Ok(())
        }

        fn is_open(&self) -> bool {
            self.open
        }

        async fn close(&mut self) -> Result<(), DriverError> {
            self.open = false;
            Ok(())
        }

        async fn begin(&mut self, _isolation: IsolationLevel) -> Result<(), DriverError> {
            Ok(())
        }

        async fn commit(&mut self) -> Result<(), DriverError> {
            Ok(())
        }

        async fn rollback(&mut self) -> Result<(), DriverError> {
            Ok(())
        }

        async fn query(
            &mut self,
            sql: &str,
            _params: &[NamedParam],
        ) -> Result<ResultSet, DriverError> {
            Ok(ResultSet::new(
                vec![Column::new("sql", 0, "TEXT")],
                vec![vec![SqlValue::from(sql)]],
            ))
        }

        async fn execute(&mut self, _sql: &str, _params: &[NamedParam]) -> Result<u64, DriverError> {
            Ok(1)
        }
    }

    struct EchoDriver;

    impl Driver for EchoDriver {
        fn name(&self) -> &str {
            "echo"
        }

        fn connection(&self, _target: &ConnectionTarget) -> Box<dyn Connection> {
            Box::new(Echo { open: false })
        }
    }

    #[tokio::test]
    async fn test_connect_opens_connection() {
        let target = ConnectionTarget::parse("Server=local").unwrap();
        let conn = EchoDriver.connect(&target).await.unwrap();
        assert!(conn.is_open());
    }

    #[tokio::test]
    async fn test_default_scalar_takes_first_value() {
        let mut conn = Echo { open: true };
        let value = conn.scalar("SELECT 1", &[]).await.unwrap();
        assert_eq!(value, Some(SqlValue::from("SELECT 1")));
    }
}
