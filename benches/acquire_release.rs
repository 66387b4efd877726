// Acquire/release overhead with a factory that does no I/O.

use async_trait::async_trait;
use criterion::{Criterion, criterion_group, criterion_main};
use esox_connpool::{ConnectionFactory, ConnectionPool, PoolConfig};
use std::convert::Infallible;
use std::hint::black_box;
use std::time::Duration;

struct NoOpFactory;

#[async_trait]
impl ConnectionFactory for NoOpFactory {
    type Connection = u64;
    type Error = Infallible;

    async fn create(&self, _timeout: Duration) -> Result<u64, Infallible> {
        Ok(0)
    }

    async fn validate(&self, _conn: &u64) -> Result<(), Infallible> {
        Ok(())
    }

    async fn close(&self, _conn: u64) -> Result<(), Infallible> {
        Ok(())
    }
}

fn pool_config(min: usize, max: usize) -> PoolConfig {
    PoolConfig::new()
        .with_min_connections(min)
        .with_max_connections(max)
        .with_acquire_timeout(Duration::from_secs(5))
        .without_health_check()
        .with_metrics(false)
}

fn single_thread(c: &mut Criterion) {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("failed to build runtime");
    let pool = rt
        .block_on(ConnectionPool::new(NoOpFactory, pool_config(1, 64)))
        .expect("failed to create pool");

    c.bench_function("single_thread_acquire_release", |b| {
        b.to_async(&rt).iter(|| {
            let pool = pool.clone();
            async move {
                let conn = pool.acquire().await.unwrap();
                black_box(*conn);
                pool.release(conn).await.unwrap();
            }
        });
    });
}

fn contended(c: &mut Criterion) {
    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(4)
        .enable_all()
        .build()
        .expect("failed to build runtime");

    // Fewer slots than tasks, so acquires wait on releases.
    let pool = rt
        .block_on(ConnectionPool::new(NoOpFactory, pool_config(4, 4)))
        .expect("failed to create pool");

    c.bench_function("contended_acquire_release_4slots", |b| {
        b.to_async(&rt).iter(|| {
            let pool = pool.clone();
            async move {
                let mut tasks = Vec::with_capacity(16);
                for _ in 0..16 {
                    let pool = pool.clone();
                    tasks.push(tokio::spawn(async move {
                        let conn = pool.acquire().await.unwrap();
                        tokio::task::yield_now().await;
                        pool.release(conn).await.unwrap();
                    }));
                }
                for task in tasks {
                    task.await.unwrap();
                }
            }
        });
    });
}

fn stats_snapshot(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().expect("failed to build runtime");
    let pool = rt
        .block_on(ConnectionPool::new(NoOpFactory, pool_config(8, 16)))
        .expect("failed to create pool");

    c.bench_function("stats_snapshot", |b| {
        b.iter(|| black_box(pool.stats()));
    });
}

criterion_group!(benches, single_thread, contended, stats_snapshot);
criterion_main!(benches);
