//! Health monitoring for connection pools

use async_trait::async_trait;

/// Optional probe a factory can offer for its connections
///
/// When present it replaces `validate` during background health sweeps.
#[async_trait]
pub trait HealthCheck<C>: Send + Sync {
    async fn is_healthy(&self, conn: &C) -> bool;
}

/// Health status of a connection pool
///
/// # Examples
///
/// ```
/// use esox_connpool::HealthStatus;
///
/// let health = HealthStatus::new(3, 1, 4, 10, 2, 0, 0);
/// assert!(health.is_healthy());
/// assert_eq!(health.idle_connections, 3);
/// ```
#[derive(Debug, Clone)]
pub struct HealthStatus {
    /// Whether the pool is healthy
    pub is_healthy: bool,

    /// Number of warnings detected
    pub warning_count: usize,

    /// Current pool utilization (0.0 to 1.0)
    pub utilization: f64,

    /// Idle connections count
    pub idle_connections: usize,

    /// Active connections count
    pub active_connections: usize,

    /// Connections that currently exist
    pub total_connections: usize,

    /// Configured capacity
    pub max_connections: usize,

    /// Warning messages
    pub warnings: Vec<String>,
}

impl HealthStatus {
    /// Create a new health status
    pub fn new(
        idle: usize,
        active: usize,
        total: usize,
        max: usize,
        min: usize,
        creation_errors: u64,
        health_check_failures: u64,
    ) -> Self {
        let utilization = if max > 0 {
            active as f64 / max as f64
        } else {
            0.0
        };

        let mut warnings = Vec::new();
        let mut is_healthy = true;

        if utilization > 0.9 {
            warnings.push(format!("High utilization: {:.1}%", utilization * 100.0));
            is_healthy = false;
        }

        if idle == 0 && total >= max {
            warnings.push("Pool is exhausted".to_string());
        }

        // Replenishment is best-effort, so a shortfall means the factory keeps failing.
        if total < min {
            warnings.push(format!("Below minimum: {total} of {min} connections"));
            is_healthy = false;
        }

        if creation_errors > 0 {
            warnings.push(format!("{creation_errors} connection creation errors"));
        }

        if health_check_failures > 0 {
            warnings.push(format!("{health_check_failures} failed health checks"));
        }

        Self {
            is_healthy,
            warning_count: warnings.len(),
            utilization,
            idle_connections: idle,
            active_connections: active,
            total_connections: total,
            max_connections: max,
            warnings,
        }
    }

    /// Check if the pool is healthy
    pub fn is_healthy(&self) -> bool {
        self.is_healthy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_high_utilization_is_unhealthy() {
        let health = HealthStatus::new(0, 10, 10, 10, 2, 0, 0);
        assert!(!health.is_healthy());
        assert!(health.warnings.iter().any(|w| w.contains("High utilization")));
        assert!(health.warnings.iter().any(|w| w == "Pool is exhausted"));
    }

    #[test]
    fn test_below_minimum_is_unhealthy() {
        let health = HealthStatus::new(0, 0, 0, 10, 2, 3, 0);
        assert!(!health.is_healthy());
        assert_eq!(health.warning_count, 2);
    }

    #[test]
    fn test_failures_warn_without_flipping_health() {
        let health = HealthStatus::new(2, 0, 2, 10, 2, 0, 4);
        assert!(health.is_healthy());
        assert_eq!(health.warnings, vec!["4 failed health checks".to_string()]);
    }
}
