//! Advanced features: health probes, eviction, background workers, Prometheus

use async_trait::async_trait;
use esox_connpool::{ConnectionFactory, ConnectionPool, HealthCheck, PoolConfig, PoolResult};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Debug)]
struct Connection {
    id: usize,
    endpoint: String,
}

/// Factory whose connections can be broken from the outside
#[derive(Clone, Default)]
struct Backend {
    next: Arc<AtomicUsize>,
    broken: Arc<Mutex<HashSet<usize>>>,
}

impl Backend {
    fn break_connection(&self, id: usize) {
        self.broken.lock().insert(id);
    }
}

#[async_trait]
impl ConnectionFactory for Backend {
    type Connection = Connection;
    type Error = std::io::Error;

    async fn create(&self, _timeout: Duration) -> Result<Connection, Self::Error> {
        let id = self.next.fetch_add(1, Ordering::Relaxed) + 1;
        Ok(Connection {
            id,
            endpoint: format!("db-{}.internal:5432", id % 2),
        })
    }

    async fn validate(&self, conn: &Connection) -> Result<(), Self::Error> {
        if self.broken.lock().contains(&conn.id) {
            return Err(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "connection reset",
            ));
        }
        Ok(())
    }

    async fn close(&self, _conn: Connection) -> Result<(), Self::Error> {
        Ok(())
    }

    fn health_check(&self) -> Option<&dyn HealthCheck<Connection>> {
        Some(self as &dyn HealthCheck<Connection>)
    }
}

#[async_trait]
impl HealthCheck<Connection> for Backend {
    async fn is_healthy(&self, conn: &Connection) -> bool {
        !self.broken.lock().contains(&conn.id)
    }
}

#[tokio::main]
async fn main() -> PoolResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("esox_connpool=debug")),
        )
        .init();

    println!("=== Esox connection pool - Advanced Features ===\n");

    // Example 1: Health probes
    health_probes().await?;

    // Example 2: Lifetime and idle eviction
    eviction().await?;

    // Example 3: Background workers
    background_workers().await?;

    // Example 4: Prometheus metrics
    prometheus_export().await?;

    Ok(())
}

async fn health_probes() -> PoolResult<()> {
    println!("1. Health Probes:");
    let backend = Backend::default();
    let config = PoolConfig::new()
        .with_min_connections(3)
        .with_max_connections(5)
        .without_health_check();
    let pool = ConnectionPool::new(backend.clone(), config).await?;

    backend.break_connection(2);
    pool.run_health_check().await;

    let stats = pool.stats();
    println!(
        "   Probed {}, failed {}, pool back at {} connections",
        stats.health_checks,
        stats.health_check_failures,
        pool.total_count()
    );
    println!("   Health rate: {:.2}\n", pool.efficiency().health_rate);
    pool.close().await
}

async fn eviction() -> PoolResult<()> {
    println!("2. Lifetime and Idle Eviction:");
    let config = PoolConfig::new()
        .with_min_connections(0)
        .with_max_connections(4)
        .with_max_idle_time(Duration::from_millis(100))
        .with_max_lifetime(Duration::from_millis(300))
        .without_health_check();
    let pool = ConnectionPool::new(Backend::default(), config).await?;

    let conn = pool.acquire().await?;
    println!("   Using {} on {}", conn.id, conn.endpoint);
    pool.release(conn).await?;
    println!("   Idle after release: {}", pool.idle_count());

    tokio::time::sleep(Duration::from_millis(150)).await;
    pool.run_cleanup().await;
    println!("   Idle after cleanup: {}", pool.idle_count());

    let conn = pool.acquire().await?;
    tokio::time::sleep(Duration::from_millis(350)).await;
    pool.release(conn).await?;
    println!(
        "   Expired connection retired on release: total {}\n",
        pool.total_count()
    );
    pool.close().await
}

async fn background_workers() -> PoolResult<()> {
    println!("3. Background Workers:");
    let backend = Backend::default();
    let config = PoolConfig::new()
        .with_min_connections(2)
        .with_max_connections(4)
        .with_health_check(Duration::from_millis(50));
    let pool = ConnectionPool::new(backend.clone(), config).await?;

    backend.break_connection(1);
    tokio::time::sleep(Duration::from_millis(120)).await;

    let health = pool.health_status();
    println!("   Healthy: {}, total {}", health.is_healthy, health.total_connections);
    for warning in &health.warnings {
        println!("   Warning: {warning}");
    }
    println!();
    pool.close().await
}

async fn prometheus_export() -> PoolResult<()> {
    println!("4. Prometheus Metrics Export:");
    let config = PoolConfig::new().with_min_connections(3).with_max_connections(5);
    let pool = ConnectionPool::new(Backend::default(), config).await?;

    let _first = pool.acquire().await?;
    let _second = pool.acquire().await?;

    let mut tags = std::collections::HashMap::new();
    tags.insert("service".to_string(), "example".to_string());
    tags.insert("env".to_string(), "dev".to_string());

    let prometheus_text = pool.export_metrics_prometheus("example_pool", Some(&tags))?;
    println!("{}", prometheus_text);
    Ok(())
}
