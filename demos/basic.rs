//! Basic usage of ConnectionPool

use async_trait::async_trait;
use esox_connpool::{ConnectionFactory, ConnectionPool, PoolConfig, PoolError, PoolResult};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

#[derive(Debug)]
struct Session {
    id: u32,
}

#[derive(Debug, thiserror::Error)]
#[error("session error: {0}")]
struct SessionError(String);

#[derive(Default)]
struct SessionFactory {
    next: AtomicU32,
}

#[async_trait]
impl ConnectionFactory for SessionFactory {
    type Connection = Session;
    type Error = SessionError;

    async fn create(&self, _timeout: Duration) -> Result<Session, SessionError> {
        let id = self.next.fetch_add(1, Ordering::Relaxed) + 1;
        Ok(Session { id })
    }

    async fn validate(&self, _conn: &Session) -> Result<(), SessionError> {
        Ok(())
    }

    async fn close(&self, conn: Session) -> Result<(), SessionError> {
        println!("   (closing session {})", conn.id);
        Ok(())
    }
}

#[tokio::main]
async fn main() -> PoolResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    println!("=== Esox connection pool - Basic Examples ===\n");

    // Example 1: Simple pool
    simple_pool().await?;

    // Example 2: Pool with configuration
    configured_pool().await?;

    // Example 3: Acquire timeouts
    acquire_timeout().await?;

    // Example 4: Metrics and health
    metrics_and_health().await?;

    Ok(())
}

async fn simple_pool() -> PoolResult<()> {
    println!("1. Simple Pool:");
    let pool = ConnectionPool::new(SessionFactory::default(), PoolConfig::default()).await?;

    let conn = pool.acquire().await?;
    println!("   Got session: {}", conn.id);
    pool.release(conn).await?;

    println!("   Idle after release: {}\n", pool.idle_count());
    pool.close().await
}

async fn configured_pool() -> PoolResult<()> {
    println!("2. Configured Pool:");

    let config = PoolConfig::new()
        .with_min_connections(1)
        .with_max_connections(5)
        .with_max_idle_time(Duration::from_secs(60))
        .with_max_lifetime(Duration::from_secs(600));
    let pool = ConnectionPool::new(SessionFactory::default(), config).await?;

    {
        let _first = pool.acquire().await?;
        let _second = pool.acquire().await?;
        println!("   Active connections: {}", pool.active_count());
        println!("   Total connections: {}", pool.total_count());
    }

    // Dropped handles find their own way back.
    tokio::time::sleep(Duration::from_millis(10)).await;
    println!("   After drop - Idle: {}\n", pool.idle_count());
    pool.close().await
}

async fn acquire_timeout() -> PoolResult<()> {
    println!("3. Acquire Timeouts:");
    let config = PoolConfig::new().with_min_connections(1).with_max_connections(1);
    let pool = ConnectionPool::new(SessionFactory::default(), config).await?;

    let held = pool.acquire().await?;
    println!("   First acquire: Success");

    match pool.acquire_timeout(Duration::from_millis(100)).await {
        Err(PoolError::Timeout(waited)) => println!("   Second acquire: timed out after {waited:?}"),
        Err(e) => println!("   Second acquire: {e}"),
        Ok(_) => println!("   Second acquire: unexpectedly succeeded"),
    }

    pool.release(held).await?;
    let again = pool.acquire_timeout(Duration::from_millis(100)).await?;
    println!("   Third acquire: Success (usage count {})\n", again.usage_count());
    pool.release(again).await?;
    pool.close().await
}

async fn metrics_and_health() -> PoolResult<()> {
    println!("4. Metrics and Health:");
    let config = PoolConfig::new().with_min_connections(2).with_max_connections(4);
    let pool = ConnectionPool::new(SessionFactory::default(), config).await?;

    let first = pool.acquire().await?;
    let second = pool.acquire().await?;

    let health = pool.health_status();
    println!("   Health: {}", if health.is_healthy { "Healthy" } else { "Unhealthy" });
    println!("   Utilization: {:.1}%", health.utilization * 100.0);
    println!(
        "   Active: {}, Idle: {}",
        health.active_connections, health.idle_connections
    );

    pool.release(first).await?;
    pool.release(second).await?;

    let mut metrics: Vec<_> = pool.stats().export().into_iter().collect();
    metrics.sort();
    println!("\n   Metrics:");
    for (key, value) in metrics {
        println!("     {}: {}", key, value);
    }

    pool.close().await
}
