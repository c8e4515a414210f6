//! Benchmarks for pool checkout and return.
//!
//! Uses the in-memory mock driver, so the numbers measure pool overhead only.

#![allow(missing_docs, clippy::unwrap_used)]

use std::hint::black_box;
use std::sync::Arc;

use criterion::{Criterion, criterion_group, criterion_main};
use sqlpool::{Pool, PoolConfig};
use sqlpool_driver::ConnectionTarget;
use sqlpool_testing::{MOCK_TARGET, MockDriver};

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(4)
        .enable_all()
        .build()
        .unwrap()
}

async fn warm_pool(max: u32) -> Pool {
    Pool::new(
        Arc::new(MockDriver::new()),
        ConnectionTarget::parse(MOCK_TARGET).unwrap(),
        PoolConfig::new().min_connections(max).max_connections(max),
    )
    .await
    .unwrap()
}

fn bench_acquire_release(c: &mut Criterion) {
    let rt = runtime();
    let pool = rt.block_on(warm_pool(4));

    let mut group = c.benchmark_group("pool");

    group.bench_function("acquire_drop", |b| {
        b.to_async(&rt).iter(|| async {
            let conn = pool.acquire().await.unwrap();
            black_box(conn.metadata().id);
        })
    });

    group.bench_function("acquire_release", |b| {
        b.to_async(&rt).iter(|| async {
            let conn = pool.acquire().await.unwrap();
            pool.release(conn).await.unwrap();
        })
    });

    group.bench_function("try_acquire", |b| {
        b.to_async(&rt).iter(|| async {
            let conn = pool.try_acquire().await.unwrap();
            black_box(conn.is_some());
        })
    });

    group.finish();
    rt.block_on(pool.dispose());
}

fn bench_contended(c: &mut Criterion) {
    let rt = runtime();
    let pool = Arc::new(rt.block_on(warm_pool(2)));

    c.bench_function("pool/contended_8_tasks", |b| {
        b.to_async(&rt).iter(|| {
            let pool = Arc::clone(&pool);
            async move {
                let mut handles = Vec::with_capacity(8);
                for _ in 0..8 {
                    let pool = Arc::clone(&pool);
                    handles.push(tokio::spawn(async move {
                        let conn = pool.acquire().await.unwrap();
                        tokio::task::yield_now().await;
                        pool.release(conn).await.unwrap();
                    }));
                }
                for handle in handles {
                    handle.await.unwrap();
                }
            }
        })
    });

    rt.block_on(pool.dispose());
}

criterion_group!(benches, bench_acquire_release, bench_contended);
criterion_main!(benches);
