//! Statistics collection and export for connection pools

use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, SystemTime};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Accumulated pool statistics
///
/// Counters only grow. The `*_connections` gauges are copies of the pool's
/// atomic counters taken by the metrics worker or by
/// [`ConnectionPool::stats`](crate::ConnectionPool::stats); they are never
/// used for admission decisions.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PoolStatistics {
    /// Connections successfully created
    pub total_created: u64,

    /// Connections retired through the factory
    pub total_destroyed: u64,

    /// Acquire attempts, including those that timed out or failed
    pub total_acquires: u64,

    /// Connections handed back to the idle store on release
    pub total_releases: u64,

    /// Acquire attempts that hit their deadline
    pub total_timeouts: u64,

    /// Factory create failures and creation timeouts
    pub creation_errors: u64,

    /// Individual connections probed by the health sweep
    pub health_checks: u64,

    /// Connections that failed a health probe
    pub health_check_failures: u64,

    /// Connections rejected by `validate` on release or cleanup
    pub validation_failures: u64,

    /// Sum of acquire latencies
    pub total_acquire_time: Duration,

    /// Mean acquire latency
    pub average_acquire_time: Duration,

    /// Active connections at the last snapshot
    pub active_connections: usize,

    /// Idle connections at the last snapshot
    pub idle_connections: usize,

    /// Existing connections at the last snapshot
    pub total_connections: usize,

    /// When the pool was created
    pub start_time: SystemTime,

    /// Last acquire, release or retirement
    pub last_activity: SystemTime,
}

impl PoolStatistics {
    fn new() -> Self {
        let now = SystemTime::now();
        Self {
            total_created: 0,
            total_destroyed: 0,
            total_acquires: 0,
            total_releases: 0,
            total_timeouts: 0,
            creation_errors: 0,
            health_checks: 0,
            health_check_failures: 0,
            validation_failures: 0,
            total_acquire_time: Duration::ZERO,
            average_acquire_time: Duration::ZERO,
            active_connections: 0,
            idle_connections: 0,
            total_connections: 0,
            start_time: now,
            last_activity: now,
        }
    }

    /// Time since the pool was created
    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed().unwrap_or_default()
    }

    /// Share of acquires that did not time out
    pub fn hit_rate(&self) -> f64 {
        ratio(
            self.total_acquires.saturating_sub(self.total_timeouts),
            self.total_acquires,
        )
    }

    /// Share of health probes that passed
    pub fn health_rate(&self) -> f64 {
        ratio(
            self.health_checks.saturating_sub(self.health_check_failures),
            self.health_checks,
        )
    }

    /// Connections retired per connection created
    pub fn turnover(&self) -> f64 {
        ratio(self.total_destroyed, self.total_created)
    }

    /// Export statistics as a HashMap
    ///
    /// # Examples
    ///
    /// ```
    /// # async fn demo() -> esox_connpool::PoolResult<()> {
    /// # use esox_connpool::{ConnectionFactory, ConnectionPool, PoolConfig};
    /// # use async_trait::async_trait;
    /// # use std::time::Duration;
    /// # struct Unit;
    /// # #[async_trait]
    /// # impl ConnectionFactory for Unit {
    /// #     type Connection = ();
    /// #     type Error = std::io::Error;
    /// #     async fn create(&self, _: Duration) -> Result<(), Self::Error> { Ok(()) }
    /// #     async fn validate(&self, _: &()) -> Result<(), Self::Error> { Ok(()) }
    /// #     async fn close(&self, _: ()) -> Result<(), Self::Error> { Ok(()) }
    /// # }
    /// let pool = ConnectionPool::new(Unit, PoolConfig::default()).await?;
    /// let exported = pool.stats().export();
    /// assert_eq!(exported["total_created"], "2");
    /// assert_eq!(exported["idle_connections"], "2");
    /// # pool.close().await
    /// # }
    /// ```
    pub fn export(&self) -> HashMap<String, String> {
        let mut metrics = HashMap::new();
        metrics.insert("total_created".to_string(), self.total_created.to_string());
        metrics.insert("total_destroyed".to_string(), self.total_destroyed.to_string());
        metrics.insert("total_acquires".to_string(), self.total_acquires.to_string());
        metrics.insert("total_releases".to_string(), self.total_releases.to_string());
        metrics.insert("total_timeouts".to_string(), self.total_timeouts.to_string());
        metrics.insert("creation_errors".to_string(), self.creation_errors.to_string());
        metrics.insert("health_checks".to_string(), self.health_checks.to_string());
        metrics.insert("health_check_failures".to_string(), self.health_check_failures.to_string());
        metrics.insert("validation_failures".to_string(), self.validation_failures.to_string());
        metrics.insert(
            "average_acquire_time_ms".to_string(),
            format!("{:.3}", self.average_acquire_time.as_secs_f64() * 1000.0),
        );
        metrics.insert("active_connections".to_string(), self.active_connections.to_string());
        metrics.insert("idle_connections".to_string(), self.idle_connections.to_string());
        metrics.insert("total_connections".to_string(), self.total_connections.to_string());
        metrics.insert("hit_rate".to_string(), format!("{:.2}", self.hit_rate()));
        metrics
    }
}

/// Derived efficiency ratios, each 0.0 when its denominator is zero
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PoolEfficiency {
    /// (acquires - timeouts) / acquires
    pub hit_rate: f64,

    /// (health checks - failures) / health checks
    pub health_rate: f64,

    /// active / max_connections
    pub utilization: f64,

    /// destroyed / created
    pub turnover: f64,
}

pub(crate) fn ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator > 0 {
        numerator as f64 / denominator as f64
    } else {
        0.0
    }
}

/// Internal statistics tracker
///
/// Guarded by its own lock so snapshotting never contends with admission.
pub(crate) struct StatsTracker {
    inner: Mutex<PoolStatistics>,
}

impl StatsTracker {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(PoolStatistics::new()),
        }
    }

    pub fn snapshot(&self) -> PoolStatistics {
        self.inner.lock().clone()
    }

    pub fn record_created(&self) {
        let mut stats = self.inner.lock();
        stats.total_created += 1;
        stats.last_activity = SystemTime::now();
    }

    pub fn record_destroyed(&self) {
        let mut stats = self.inner.lock();
        stats.total_destroyed += 1;
        stats.last_activity = SystemTime::now();
    }

    pub fn record_creation_error(&self) {
        self.inner.lock().creation_errors += 1;
    }

    pub fn record_acquire(&self, elapsed: Duration, timed_out: bool) {
        let mut stats = self.inner.lock();
        stats.total_acquires += 1;
        if timed_out {
            stats.total_timeouts += 1;
        }
        stats.total_acquire_time += elapsed;
        stats.average_acquire_time = stats
            .total_acquire_time
            .checked_div(u32::try_from(stats.total_acquires).unwrap_or(u32::MAX))
            .unwrap_or_default();
        stats.last_activity = SystemTime::now();
    }

    pub fn record_release(&self) {
        let mut stats = self.inner.lock();
        stats.total_releases += 1;
        stats.last_activity = SystemTime::now();
    }

    pub fn record_health_check(&self, healthy: bool) {
        let mut stats = self.inner.lock();
        stats.health_checks += 1;
        if !healthy {
            stats.health_check_failures += 1;
        }
    }

    pub fn record_validation_failure(&self) {
        self.inner.lock().validation_failures += 1;
    }

    pub fn update_gauges(&self, active: usize, idle: usize, total: usize) {
        let mut stats = self.inner.lock();
        stats.active_connections = active;
        stats.idle_connections = idle;
        stats.total_connections = total;
    }
}

impl Default for StatsTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Metrics exporter for Prometheus format
#[cfg(feature = "metrics")]
pub struct MetricsExporter;

#[cfg(feature = "metrics")]
impl MetricsExporter {
    /// Export statistics in Prometheus exposition format
    ///
    /// Every series carries a `pool` label plus any extra `tags`.
    pub fn export_prometheus(
        stats: &PoolStatistics,
        pool_name: &str,
        tags: Option<&HashMap<String, String>>,
    ) -> crate::PoolResult<String> {
        use prometheus::{Encoder, IntCounter, IntGauge, Opts, Registry, TextEncoder};

        let mut labels = HashMap::new();
        labels.insert("pool".to_string(), pool_name.to_string());
        if let Some(tags) = tags {
            for (key, value) in tags {
                labels.insert(key.clone(), value.clone());
            }
        }

        let registry = Registry::new_custom(Some("connpool".to_string()), Some(labels))
            .map_err(metrics_error)?;

        let gauges: [(&str, &str, usize); 3] = [
            ("connections_active", "Connections currently checked out", stats.active_connections),
            ("connections_idle", "Connections waiting in the idle store", stats.idle_connections),
            ("connections_total", "Connections that currently exist", stats.total_connections),
        ];
        for (name, help, value) in gauges {
            let gauge = IntGauge::with_opts(Opts::new(name, help)).map_err(metrics_error)?;
            gauge.set(i64::try_from(value).unwrap_or(i64::MAX));
            registry.register(Box::new(gauge)).map_err(metrics_error)?;
        }

        let counters: [(&str, &str, u64); 9] = [
            ("created_total", "Connections created", stats.total_created),
            ("destroyed_total", "Connections retired", stats.total_destroyed),
            ("acquires_total", "Acquire attempts", stats.total_acquires),
            ("releases_total", "Connections returned to the idle store", stats.total_releases),
            ("timeouts_total", "Acquire attempts that timed out", stats.total_timeouts),
            ("creation_errors_total", "Failed connection creations", stats.creation_errors),
            ("health_checks_total", "Health probes run", stats.health_checks),
            ("health_check_failures_total", "Failed health probes", stats.health_check_failures),
            ("validation_failures_total", "Failed validations", stats.validation_failures),
        ];
        for (name, help, value) in counters {
            let counter = IntCounter::with_opts(Opts::new(name, help)).map_err(metrics_error)?;
            counter.inc_by(value);
            registry.register(Box::new(counter)).map_err(metrics_error)?;
        }

        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&registry.gather(), &mut buffer)
            .map_err(metrics_error)?;
        String::from_utf8(buffer).map_err(metrics_error)
    }
}

#[cfg(feature = "metrics")]
fn metrics_error(err: impl std::fmt::Display) -> crate::PoolError {
    crate::PoolError::Metrics(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ratios_guard_zero_denominators() {
        let stats = StatsTracker::new().snapshot();
        assert_eq!(stats.hit_rate(), 0.0);
        assert_eq!(stats.health_rate(), 0.0);
        assert_eq!(stats.turnover(), 0.0);
    }

    #[test]
    fn test_acquire_latency_average() {
        let tracker = StatsTracker::new();
        tracker.record_acquire(Duration::from_millis(10), false);
        tracker.record_acquire(Duration::from_millis(30), true);

        let stats = tracker.snapshot();
        assert_eq!(stats.total_acquires, 2);
        assert_eq!(stats.total_timeouts, 1);
        assert_eq!(stats.total_acquire_time, Duration::from_millis(40));
        assert_eq!(stats.average_acquire_time, Duration::from_millis(20));
        assert_eq!(stats.hit_rate(), 0.5);
    }

    #[test]
    fn test_health_rate_and_turnover() {
        let tracker = StatsTracker::new();
        for healthy in [true, true, true, false] {
            tracker.record_health_check(healthy);
        }
        for _ in 0..4 {
            tracker.record_created();
        }
        tracker.record_destroyed();

        let stats = tracker.snapshot();
        assert_eq!(stats.health_rate(), 0.75);
        assert_eq!(stats.turnover(), 0.25);
    }

    #[test]
    fn test_export_contains_counters() {
        let tracker = StatsTracker::new();
        tracker.record_created();
        tracker.update_gauges(1, 0, 1);

        let exported = tracker.snapshot().export();
        assert_eq!(exported["total_created"], "1");
        assert_eq!(exported["active_connections"], "1");
        assert_eq!(exported["hit_rate"], "0.00");
    }

    #[cfg(feature = "metrics")]
    #[test]
    fn test_prometheus_export() {
        let tracker = StatsTracker::new();
        tracker.record_created();
        tracker.update_gauges(1, 2, 3);

        let mut tags = HashMap::new();
        tags.insert("service".to_string(), "api".to_string());

        let output =
            MetricsExporter::export_prometheus(&tracker.snapshot(), "db", Some(&tags)).unwrap();
        assert!(output.contains("connpool_connections_idle"));
        assert!(output.contains("pool=\"db\""));
        assert!(output.contains("service=\"api\""));
        assert!(output.contains("connpool_created_total"));
    }
}
