//! Concurrent usage, resizing and shutdown

use async_trait::async_trait;
use esox_connpool::{ConnectionFactory, ConnectionPool, PoolConfig, PoolResult};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio::time::sleep;

/// Pretends to dial a remote endpoint
struct Dialer {
    dialed: AtomicU32,
    latency: Duration,
}

impl Dialer {
    fn new(latency: Duration) -> Self {
        Self {
            dialed: AtomicU32::new(0),
            latency,
        }
    }
}

#[async_trait]
impl ConnectionFactory for Dialer {
    type Connection = u32;
    type Error = std::io::Error;

    async fn create(&self, _timeout: Duration) -> Result<u32, Self::Error> {
        sleep(self.latency).await;
        Ok(self.dialed.fetch_add(1, Ordering::Relaxed) + 1)
    }

    async fn validate(&self, _conn: &u32) -> Result<(), Self::Error> {
        Ok(())
    }

    async fn close(&self, _conn: u32) -> Result<(), Self::Error> {
        Ok(())
    }
}

#[tokio::main]
async fn main() -> PoolResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    println!("=== Esox connection pool - Async Examples ===\n");

    // Example 1: Concurrent access
    concurrent_access().await?;

    // Example 2: Waiting for a release
    wait_for_release().await?;

    // Example 3: Resize at runtime
    resize_at_runtime().await?;

    // Example 4: Shutdown
    shutdown().await?;

    Ok(())
}

async fn concurrent_access() -> PoolResult<()> {
    println!("1. Concurrent Access:");
    let config = PoolConfig::new().with_min_connections(2).with_max_connections(4);
    let pool = ConnectionPool::new(Dialer::new(Duration::from_millis(5)), config).await?;

    let mut handles = vec![];
    for task in 0..10 {
        let pool = pool.clone();
        handles.push(tokio::spawn(async move {
            let conn = pool.acquire().await?;
            println!("   Task {} using connection {}", task, *conn);
            sleep(Duration::from_millis(10)).await;
            pool.release(conn).await
        }));
    }

    for handle in handles {
        if let Ok(Err(e)) = handle.await {
            println!("   Task failed: {e}");
        }
    }

    let stats = pool.stats();
    println!(
        "   Created {} connections for {} acquires\n",
        stats.total_created, stats.total_acquires
    );
    pool.close().await
}

async fn wait_for_release() -> PoolResult<()> {
    println!("2. Waiting for a Release:");
    let config = PoolConfig::new().with_min_connections(1).with_max_connections(1);
    let pool = ConnectionPool::new(Dialer::new(Duration::ZERO), config).await?;

    let held = pool.acquire().await?;
    let waiter = {
        let pool = pool.clone();
        tokio::spawn(async move {
            let started = std::time::Instant::now();
            let conn = pool.acquire_timeout(Duration::from_secs(1)).await?;
            println!("   Waiter got connection after {:?}", started.elapsed());
            pool.release(conn).await
        })
    };

    sleep(Duration::from_millis(50)).await;
    pool.release(held).await?;
    if let Ok(Err(e)) = waiter.await {
        println!("   Waiter failed: {e}");
    }

    println!();
    pool.close().await
}

async fn resize_at_runtime() -> PoolResult<()> {
    println!("3. Resize at Runtime:");
    let config = PoolConfig::new().with_min_connections(1).with_max_connections(8);
    let pool = ConnectionPool::new(Dialer::new(Duration::ZERO), config).await?;
    println!("   Start: {} connections", pool.total_count());

    pool.resize(4, 8).await?;
    println!("   After resize(4, 8): {} connections", pool.total_count());

    pool.resize(1, 2).await?;
    println!("   After resize(1, 2): {} connections\n", pool.total_count());
    pool.close().await
}

async fn shutdown() -> PoolResult<()> {
    println!("4. Shutdown:");
    let pool = ConnectionPool::new(Dialer::new(Duration::ZERO), PoolConfig::default()).await?;

    let conn = pool.acquire().await?;
    pool.close().await?;
    println!("   Closed: {}", pool.is_closed());

    match pool.acquire().await {
        Err(e) => println!("   Acquire after close: {e}"),
        Ok(_) => println!("   Acquire after close: unexpectedly succeeded"),
    }
    match pool.release(conn).await {
        Err(e) => println!("   Release after close: {e} (connection retired)"),
        Ok(()) => println!("   Release after close: accepted"),
    }
    Ok(())
}
