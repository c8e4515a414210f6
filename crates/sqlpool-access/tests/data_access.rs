//! Data access tests against the in-memory mock driver.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::sync::Arc;
use std::time::Duration;

use sqlpool_access::{DataAccess, DataAccessConfig, Error, IsolationLevel, NamedParam, SqlValue};
use sqlpool_driver::DriverError;
use sqlpool_testing::{MOCK_TARGET, MockDriver, MockResponse};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter("sqlpool=debug,sqlpool_access=debug")
        .try_init();
}

fn driver() -> MockDriver {
    MockDriver::builder()
        .with_response("SELECT 1", MockResponse::scalar(1))
        .with_response(
            "SELECT id, name FROM users",
            MockResponse::rows(
                &["id", "name"],
                vec![
                    vec![SqlValue::Int(1), SqlValue::from("alice")],
                    vec![SqlValue::Int(2), SqlValue::from("bob")],
                ],
            ),
        )
        .with_response("DELETE FROM users", MockResponse::affected(2))
        .with_response("INSERT dup", MockResponse::error(2627, "duplicate key"))
        .build()
}

fn pooled_config() -> DataAccessConfig {
    DataAccessConfig::new(MOCK_TARGET).min_pool_size(1).max_pool_size(2)
}

async fn pooled(driver: &MockDriver) -> DataAccess {
    init_tracing();
    DataAccess::new(driver.clone(), pooled_config()).await.unwrap()
}

async fn direct(driver: &MockDriver) -> DataAccess {
    init_tracing();
    DataAccess::new(
        driver.clone(),
        DataAccessConfig::new(MOCK_TARGET).use_connection_pool(false),
    )
    .await
    .unwrap()
}

// =============================================================================
// Construction
// =============================================================================

#[tokio::test]
async fn test_empty_target_is_configuration_error() {
    let err = DataAccess::new(MockDriver::new(), DataAccessConfig::new(""))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Configuration(_)));
}

#[tokio::test]
async fn test_unparseable_target_is_configuration_error() {
    let err = DataAccess::new(MockDriver::new(), DataAccessConfig::new("Database=app"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Configuration(_)));
}

#[tokio::test]
async fn test_pool_pre_open_failure_fails_construction() {
    let driver = MockDriver::builder().unreachable().build();
    let err = DataAccess::new(driver, pooled_config()).await.unwrap_err();
    assert!(matches!(err, Error::ConnectionFailed(_)));
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_from_connection_string() {
    let driver = driver();
    let db = DataAccess::from_connection_string(
        driver.clone(),
        "Server=mock;Database=test;Min Pool Size=2;Max Pool Size=3",
    )
    .await
    .unwrap();

    assert!(db.is_pooled());
    let status = db.pool_status().unwrap();
    assert_eq!(status.idle, 2);
    assert_eq!(status.max, 3);
    assert_eq!(db.config().connection_target, "Server=mock;Database=test");
    db.dispose().await;
}

// =============================================================================
// Pooled operations
// =============================================================================

#[tokio::test]
async fn test_pooled_operations_return_connection() {
    let driver = driver();
    let db = pooled(&driver).await;

    let value = db.scalar("SELECT 1", &[]).await.unwrap();
    assert_eq!(value, Some(SqlValue::Int(1)));

    let rows = db.query("SELECT id, name FROM users", &[]).await.unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(
        rows.rows()[1].get_by_name("name").and_then(SqlValue::as_str),
        Some("bob")
    );

    let affected = db
        .execute("DELETE FROM users", &[NamedParam::new("id", 1)])
        .await
        .unwrap();
    assert_eq!(affected, 2);

    let status = db.pool_status().unwrap();
    assert_eq!(status.in_use, 0);
    assert_eq!(status.idle, 1);
    assert_eq!(driver.opened(), 1);
}

#[tokio::test]
async fn test_scalar_without_rows_is_none() {
    let driver = driver();
    let db = pooled(&driver).await;
    assert_eq!(db.scalar("SELECT nothing", &[]).await.unwrap(), None);
}

#[tokio::test]
async fn test_statement_error_releases_connection() {
    let driver = driver();
    let db = pooled(&driver).await;

    let err = db.execute("INSERT dup", &[]).await.unwrap_err();
    match &err {
        Error::Statement {
            source,
            rollback_error,
        } => {
            assert_eq!(source.code(), Some(2627));
            assert!(rollback_error.is_none());
        }
        other => panic!("expected statement error, got {other:?}"),
    }
    assert!(!err.is_transient());
    assert_eq!(db.pool_status().unwrap().in_use, 0);
}

#[tokio::test]
async fn test_acquisition_failure_propagates() {
    let driver = driver();
    let db = DataAccess::new(
        driver.clone(),
        DataAccessConfig::new(MOCK_TARGET).min_pool_size(0).max_pool_size(1),
    )
    .await
    .unwrap();

    driver.set_unreachable(true);
    let err = db.query("SELECT 1", &[]).await.unwrap_err();
    assert!(matches!(err, Error::ConnectionFailed(DriverError::Connect(_))));

    let err = db
        .transaction(|tx| Box::pin(async move { tx.execute("INSERT a", &[]).await }))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ConnectionFailed(_)));
    assert_eq!(driver.begins(), 0);
}

#[tokio::test]
async fn test_operations_after_dispose_fail() {
    let driver = driver();
    let db = pooled(&driver).await;
    db.dispose().await;

    assert!(matches!(db.query("SELECT 1", &[]).await, Err(Error::PoolClosed)));
    assert_eq!(driver.live(), 0);
    db.dispose().await;
}

// =============================================================================
// Transactions
// =============================================================================

#[tokio::test]
async fn test_transaction_commits() {
    let driver = driver();
    let db = pooled(&driver).await;

    let count = db
        .transaction(|tx| {
            Box::pin(async move {
                tx.execute("INSERT a", &[]).await?;
                tx.execute("INSERT b", &[]).await?;
                Ok(tx.statement_count())
            })
        })
        .await
        .unwrap();

    assert_eq!(count, 2);
    assert_eq!(driver.committed(), vec!["INSERT a".to_string(), "INSERT b".to_string()]);
    assert_eq!(driver.begins(), 1);
    assert_eq!(driver.commits(), 1);
    assert_eq!(driver.rollbacks(), 0);
    assert_eq!(db.pool_status().unwrap().in_use, 0);
}

#[tokio::test]
async fn test_transaction_statements_share_one_connection_in_order() {
    let driver = driver();
    let db = DataAccess::new(
        driver.clone(),
        DataAccessConfig::new(MOCK_TARGET).min_pool_size(2).max_pool_size(2),
    )
    .await
    .unwrap();

    db.transaction(|tx| {
        Box::pin(async move {
            tx.execute("INSERT 1", &[]).await?;
            tx.query("SELECT 1", &[]).await?;
            tx.execute("INSERT 2", &[]).await?;
            Ok(())
        })
    })
    .await
    .unwrap();

    let log = driver.statement_log();
    let sql: Vec<&str> = log.iter().map(|(_, s)| s.as_str()).collect();
    assert_eq!(sql, ["INSERT 1", "SELECT 1", "INSERT 2"]);
    assert!(log.iter().all(|(id, _)| *id == log[0].0));
}

#[tokio::test]
async fn test_failed_transaction_has_no_net_effect() {
    let driver = driver();
    let db = pooled(&driver).await;

    let err = db
        .transaction(|tx| {
            Box::pin(async move {
                tx.execute("INSERT a", &[]).await?;
                tx.execute("INSERT dup", &[]).await?;
                Ok(())
            })
        })
        .await
        .unwrap_err();

    assert!(matches!(&err, Error::Statement { source, .. } if source.code() == Some(2627)));
    assert!(err.rollback_error().is_none());
    assert!(driver.committed().is_empty());
    assert_eq!(driver.rollbacks(), 1);
    assert_eq!(driver.commits(), 0);

    let status = db.pool_status().unwrap();
    assert_eq!(status.in_use, 0);
    assert_eq!(status.idle, 1);
    assert_eq!(driver.opened(), 1);
}

#[tokio::test]
async fn test_failed_rollback_is_attached_to_statement_error() {
    let driver = driver();
    let db = pooled(&driver).await;
    driver.set_fail_rollbacks(true);

    let err = db
        .transaction(|tx| {
            Box::pin(async move {
                tx.execute("INSERT dup", &[]).await?;
                Ok(())
            })
        })
        .await
        .unwrap_err();

    assert_eq!(err.driver_error().and_then(DriverError::code), Some(2627));
    assert!(matches!(err.rollback_error(), Some(DriverError::Transaction(_))));

    // Session state is unknown after a failed rollback, so the connection
    // is closed rather than recycled.
    let status = db.pool_status().unwrap();
    assert_eq!(status.in_use, 0);
    assert_eq!(status.idle, 0);
    assert_eq!(status.open, 0);
    assert!(driver.was_closed(1));
}

#[tokio::test(start_paused = true)]
async fn test_transaction_dropped_mid_flight_closes_connection() {
    let driver = driver();
    let db = pooled(&driver).await;

    let abandoned = tokio::time::timeout(
        Duration::from_millis(50),
        db.transaction(|tx| {
            Box::pin(async move {
                tx.execute("INSERT a", &[]).await?;
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(())
            })
        }),
    )
    .await;
    assert!(abandoned.is_err());

    // The close runs on a spawned task.
    tokio::time::sleep(Duration::from_millis(1)).await;
    assert!(driver.was_closed(1));
    let status = db.pool_status().unwrap();
    assert_eq!(status.idle, 0);
    assert_eq!(status.in_use, 0);
    assert_eq!(status.open, 0);

    db.execute("INSERT b", &[]).await.unwrap();
    assert_eq!(driver.committed(), vec!["INSERT b".to_string()]);

    db.transaction(|tx| Box::pin(async move { tx.execute("INSERT c", &[]).await }))
        .await
        .unwrap();
    assert_eq!(
        driver.committed(),
        vec!["INSERT b".to_string(), "INSERT c".to_string()]
    );
    assert_eq!(driver.begins(), 2);
    assert_eq!(driver.commits(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_panicking_unit_of_work_closes_connection() {
    let driver = driver();
    let db = Arc::new(pooled(&driver).await);

    let task = {
        let db = Arc::clone(&db);
        tokio::spawn(async move {
            db.transaction::<(), _>(|tx| {
                Box::pin(async move {
                    tx.execute("INSERT a", &[]).await?;
                    panic!("unit of work failed");
                })
            })
            .await
        })
    };
    assert!(task.await.unwrap_err().is_panic());

    tokio::time::sleep(Duration::from_millis(1)).await;
    assert!(driver.was_closed(1));
    assert!(driver.committed().is_empty());
    assert_eq!(db.pool_status().unwrap().open, 0);

    db.execute("INSERT b", &[]).await.unwrap();
    assert_eq!(driver.committed(), vec!["INSERT b".to_string()]);
}

#[tokio::test]
async fn test_failed_rollback_leaves_other_errors_unchanged() {
    let driver = driver();
    let db = pooled(&driver).await;
    driver.set_fail_rollbacks(true);

    let err = db
        .transaction::<(), _>(|_tx| {
            Box::pin(async move { Err(Error::InvalidArgument("order total is negative".into())) })
        })
        .await
        .unwrap_err();

    assert!(matches!(err, Error::InvalidArgument(msg) if msg == "order total is negative"));
    assert_eq!(driver.rollbacks(), 1);
}

#[tokio::test]
async fn test_transaction_with_isolation_level() {
    let driver = driver();
    let db = pooled(&driver).await;

    let level = db
        .transaction_with(IsolationLevel::Serializable, |tx| {
            Box::pin(async move { Ok(tx.isolation_level()) })
        })
        .await
        .unwrap();

    assert_eq!(level, IsolationLevel::Serializable);
    assert_eq!(driver.commits(), 1);
}

// =============================================================================
// Direct mode
// =============================================================================

#[tokio::test]
async fn test_direct_mode_rejects_transactions() {
    let driver = driver();
    let db = direct(&driver).await;

    assert!(!db.is_pooled());
    assert!(db.pool_status().is_none());

    let err = db
        .transaction(|tx| Box::pin(async move { tx.execute("INSERT a", &[]).await }))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::UnsupportedOperation(_)));
    assert_eq!(driver.opened(), 0);
    assert_eq!(driver.begins(), 0);
}

#[tokio::test]
async fn test_direct_mode_opens_and_closes_per_operation() {
    let driver = driver();
    let db = direct(&driver).await;

    assert_eq!(db.scalar("SELECT 1", &[]).await.unwrap(), Some(SqlValue::Int(1)));
    db.execute("INSERT dup", &[]).await.unwrap_err();

    assert_eq!(driver.opened(), 2);
    assert_eq!(driver.closed(), 2);
    assert_eq!(driver.live(), 0);

    db.dispose().await;
}

#[tokio::test]
async fn test_direct_mode_connection_failure() {
    let driver = MockDriver::builder().unreachable().build();
    let db = direct(&driver).await;

    let err = db.execute("INSERT a", &[]).await.unwrap_err();
    assert!(matches!(err, Error::ConnectionFailed(_)));
}
