//! # Esox connection pool
//!
//! Bounded, self-maintaining async connection pool for expensive resources:
//! database handles, sockets, anything a [`ConnectionFactory`] can create.
//!
//! ## Features
//!
//! - Lazy creation up to `max_connections`, pre-warmed to `min_connections`
//! - Lock-free admission: a compare-and-increment gates every creation
//! - Deadline-bounded acquire that wakes on release instead of polling
//! - Non-blocking release with lifetime and validity checks
//! - Background health-check, cleanup and metrics workers with cooperative shutdown
//! - Runtime resizing
//! - Statistics, efficiency ratios and Prometheus export
//!
//! ## Quick Start
//!
//! ```rust
//! use async_trait::async_trait;
//! use esox_connpool::{ConnectionFactory, ConnectionPool, PoolConfig};
//! use std::time::Duration;
//!
//! struct Sessions;
//!
//! #[async_trait]
//! impl ConnectionFactory for Sessions {
//!     type Connection = String;
//!     type Error = std::io::Error;
//!
//!     async fn create(&self, _timeout: Duration) -> Result<String, Self::Error> {
//!         Ok("session".to_string())
//!     }
//!
//!     async fn validate(&self, _conn: &String) -> Result<(), Self::Error> {
//!         Ok(())
//!     }
//!
//!     async fn close(&self, _conn: String) -> Result<(), Self::Error> {
//!         Ok(())
//!     }
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> esox_connpool::PoolResult<()> {
//! let pool = ConnectionPool::new(Sessions, PoolConfig::default()).await?;
//! {
//!     let conn = pool.acquire().await?;
//!     println!("Got: {}", *conn);
//!     pool.release(conn).await?;
//! }
//! pool.close().await?;
//! # Ok(())
//! # }
//! ```

mod config;
mod errors;
mod eviction;
mod factory;
mod guard;
mod health;
mod idle;
mod maintenance;
mod metrics;
mod pool;
mod record;

#[cfg(test)]
mod testing;

pub use config::PoolConfig;
pub use errors::{PoolError, PoolResult};
pub use factory::ConnectionFactory;
pub use health::{HealthCheck, HealthStatus};
pub use maintenance::{CLEANUP_INTERVAL, METRICS_INTERVAL};
#[cfg(feature = "metrics")]
pub use metrics::MetricsExporter;
pub use metrics::{PoolEfficiency, PoolStatistics};
pub use pool::ConnectionPool;
pub use record::PooledConnection;
