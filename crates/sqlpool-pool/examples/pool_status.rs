//! Pool usage and status monitoring against the in-memory mock driver.
//!
//! # Running
//!
//! ```bash
//! RUST_LOG=sqlpool=debug cargo run -p sqlpool --example pool_status
//! ```

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use sqlpool::{Pool, PoolError, PoolStatus};
use sqlpool_testing::{MOCK_TARGET, MockDriver, MockResponse};
use tokio::time::Instant;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let driver = MockDriver::builder()
        .with_response("SELECT 1", MockResponse::scalar(1))
        .with_connect_delay(Duration::from_millis(20))
        .build();

    let pool = Arc::new(
        Pool::builder()
            .driver(driver.clone())
            .target(MOCK_TARGET)
            .min_connections(2)
            .max_connections(5)
            .maintenance_interval(Duration::from_secs(1))
            .build()
            .await?,
    );

    println!("=== Connection Pool Example ===\n");
    print_status(&pool.status());

    println!("\n1. Single checkout:");
    {
        let mut conn = pool.acquire().await?;
        let value = conn.scalar("SELECT 1", &[]).await?;
        println!("  SELECT 1 -> {value:?}");
        // Returned to the pool on drop
    }

    println!("\n2. 20 concurrent queries on 5 connections:");
    let start = Instant::now();
    let mut handles = Vec::new();
    for i in 0..20 {
        let pool = Arc::clone(&pool);
        handles.push(tokio::spawn(async move {
            let mut conn = pool.acquire().await?;
            tokio::time::sleep(Duration::from_millis(50)).await;
            conn.execute("UPDATE counters SET n = n + 1", &[]).await.ok();
            Ok::<_, PoolError>(i)
        }));
    }
    let mut completed = 0;
    for handle in handles {
        if handle.await?.is_ok() {
            completed += 1;
        }
    }
    println!("  Completed {completed} in {:?}", start.elapsed());
    print_status(&pool.status());
    println!("  Physical connections opened: {}", driver.opened());

    println!("\n3. Maintenance after connections drop:");
    driver.sever_all();
    let report = pool.maintain().await;
    println!("  {report:?}");
    print_status(&pool.status());

    pool.dispose().await;
    println!("\nPool disposed; live connections: {}", driver.live());
    Ok(())
}

fn print_status(status: &PoolStatus) {
    println!(
        "  idle={} in_use={} open={} waiting={} max={} ({:.1}% utilized)",
        status.idle,
        status.in_use,
        status.open,
        status.waiting,
        status.max,
        status.utilization()
    );
}
