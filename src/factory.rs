//! The capability a caller supplies to create, check and dispose connections

use crate::health::HealthCheck;
use async_trait::async_trait;
use std::time::Duration;

/// Creates, validates and closes the underlying connections
///
/// The pool never looks inside a connection; everything it knows about one
/// comes through this trait. A factory may additionally expose a
/// [`HealthCheck`] through [`ConnectionFactory::health_check`], which the
/// background health sweep then prefers over [`ConnectionFactory::validate`].
///
/// # Examples
///
/// ```
/// use async_trait::async_trait;
/// use esox_connpool::ConnectionFactory;
/// use std::time::Duration;
///
/// struct EchoFactory;
///
/// #[async_trait]
/// impl ConnectionFactory for EchoFactory {
///     type Connection = String;
///     type Error = std::io::Error;
///
///     async fn create(&self, _timeout: Duration) -> Result<String, Self::Error> {
///         Ok("echo".to_string())
///     }
///
///     async fn validate(&self, _conn: &String) -> Result<(), Self::Error> {
///         Ok(())
///     }
///
///     async fn close(&self, _conn: String) -> Result<(), Self::Error> {
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait ConnectionFactory: Send + Sync + 'static {
    /// The pooled resource
    type Connection: Send + Sync + 'static;

    /// Error reported by the factory operations
    type Error: std::error::Error + Send + Sync + 'static;

    /// Open a new connection. Implementations should give up after `timeout`;
    /// the pool enforces the bound as well.
    async fn create(&self, timeout: Duration) -> Result<Self::Connection, Self::Error>;

    /// `Ok(())` means the connection is still usable
    async fn validate(&self, conn: &Self::Connection) -> Result<(), Self::Error>;

    /// Dispose of a connection. Failures are logged, never escalated.
    async fn close(&self, conn: Self::Connection) -> Result<(), Self::Error>;

    /// Optional health-check capability
    fn health_check(&self) -> Option<&dyn HealthCheck<Self::Connection>> {
        None
    }
}
