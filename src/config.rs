//! Pool configuration options

use crate::errors::{PoolError, PoolResult};
use std::time::Duration;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Configuration for connection pool behavior
///
/// # Examples
///
/// ```
/// use esox_connpool::PoolConfig;
/// use std::time::Duration;
///
/// let config = PoolConfig::new()
///     .with_min_connections(1)
///     .with_max_connections(20)
///     .with_acquire_timeout(Duration::from_secs(5))
///     .with_max_lifetime(Duration::from_secs(600));
///
/// assert_eq!(config.max_connections, 20);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PoolConfig {
    /// Number of connections the pool keeps alive at all times
    pub min_connections: usize,

    /// Upper bound on connections that exist at once, idle or active
    pub max_connections: usize,

    /// Idle connections unused for longer than this are retired by the cleanup sweep
    pub max_idle_time: Duration,

    /// Connections older than this are retired on release or during cleanup
    pub max_lifetime: Duration,

    /// Bound on a single factory `create` call
    pub connection_timeout: Duration,

    /// Default deadline for `acquire`
    pub acquire_timeout: Duration,

    /// Period of the background health-check sweep
    pub health_check_interval: Duration,

    /// Run the health-check worker
    pub enable_health_check: bool,

    /// Run the metrics snapshot worker
    pub enable_metrics: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_connections: 2,
            max_connections: 10,
            max_idle_time: Duration::from_secs(5 * 60),
            max_lifetime: Duration::from_secs(30 * 60),
            connection_timeout: Duration::from_secs(30),
            acquire_timeout: Duration::from_secs(10),
            health_check_interval: Duration::from_secs(60),
            enable_health_check: true,
            enable_metrics: true,
        }
    }
}

impl PoolConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the minimum number of pooled connections
    pub fn with_min_connections(mut self, min: usize) -> Self {
        self.min_connections = min;
        self
    }

    /// Set the maximum number of pooled connections
    ///
    /// # Examples
    ///
    /// ```
    /// use esox_connpool::PoolConfig;
    ///
    /// let config = PoolConfig::new().with_max_connections(50);
    ///
    /// assert_eq!(config.max_connections, 50);
    /// ```
    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Set the idle timeout
    pub fn with_max_idle_time(mut self, idle: Duration) -> Self {
        self.max_idle_time = idle;
        self
    }

    /// Set the maximum connection lifetime
    pub fn with_max_lifetime(mut self, lifetime: Duration) -> Self {
        self.max_lifetime = lifetime;
        self
    }

    /// Set the per-connection creation timeout
    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// Set the default acquire timeout
    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    /// Enable the health-check worker with the given interval
    pub fn with_health_check(mut self, interval: Duration) -> Self {
        self.enable_health_check = true;
        self.health_check_interval = interval;
        self
    }

    /// Disable the health-check worker
    pub fn without_health_check(mut self) -> Self {
        self.enable_health_check = false;
        self
    }

    /// Enable or disable the metrics snapshot worker
    pub fn with_metrics(mut self, enabled: bool) -> Self {
        self.enable_metrics = enabled;
        self
    }

    /// Check the sizing invariants
    ///
    /// # Examples
    ///
    /// ```
    /// use esox_connpool::{PoolConfig, PoolError};
    ///
    /// let config = PoolConfig::new()
    ///     .with_min_connections(5)
    ///     .with_max_connections(2);
    ///
    /// assert!(matches!(config.validate(), Err(PoolError::Configuration(_))));
    /// ```
    pub fn validate(&self) -> PoolResult<()> {
        validate_bounds(self.min_connections, self.max_connections)?;

        if self.enable_health_check && self.health_check_interval.is_zero() {
            return Err(PoolError::Configuration(
                "health_check_interval must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}

/// Sizing rules shared by construction and `resize`
pub(crate) fn validate_bounds(min: usize, max: usize) -> PoolResult<()> {
    if max == 0 {
        return Err(PoolError::Configuration(
            "max_connections must be at least 1".to_string(),
        ));
    }
    if max < min {
        return Err(PoolError::Configuration(format!(
            "max_connections ({max}) must not be smaller than min_connections ({min})"
        )));
    }
    Ok(())
}
