//! Background maintenance: health checks, cleanup, replenishment and gauge snapshots

use crate::eviction::RetireReason;
use crate::factory::ConnectionFactory;
use crate::pool::PoolInner;

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

/// Period of the lifetime/idle cleanup sweep
pub const CLEANUP_INTERVAL: Duration = Duration::from_secs(30);

/// Period of the gauge snapshot
pub const METRICS_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy)]
enum Task {
    HealthCheck,
    Cleanup,
    Metrics,
}

impl Task {
    fn name(self) -> &'static str {
        match self {
            Task::HealthCheck => "health-check",
            Task::Cleanup => "cleanup",
            Task::Metrics => "metrics",
        }
    }
}

/// Start the workers the configuration asks for
pub(crate) fn spawn_workers<F: ConnectionFactory>(pool: &Arc<PoolInner<F>>) -> Vec<JoinHandle<()>> {
    let config = pool.config();
    let mut workers = Vec::with_capacity(3);

    if config.enable_health_check {
        workers.push(spawn(pool, Task::HealthCheck, config.health_check_interval));
    }
    workers.push(spawn(pool, Task::Cleanup, CLEANUP_INTERVAL));
    if config.enable_metrics {
        workers.push(spawn(pool, Task::Metrics, METRICS_INTERVAL));
    }

    workers
}

/// Run `task` every `period` until the shutdown token fires or the pool is dropped
fn spawn<F: ConnectionFactory>(pool: &Arc<PoolInner<F>>, task: Task, period: Duration) -> JoinHandle<()> {
    let weak = Arc::downgrade(pool);
    let shutdown = pool.shutdown_token();

    tokio::spawn(async move {
        let start = tokio::time::Instant::now() + period;
        let mut ticker = tokio::time::interval_at(start, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let Some(pool) = weak.upgrade() else {
                break;
            };
            match task {
                Task::HealthCheck => pool.run_health_check().await,
                Task::Cleanup => pool.run_cleanup().await,
                Task::Metrics => pool.snapshot_gauges(),
            }
        }

        debug!(worker = task.name(), "Maintenance worker stopped");
    })
}

impl<F: ConnectionFactory> PoolInner<F> {
    /// Probe every idle connection, retire the unhealthy ones, then top up
    pub(crate) async fn run_health_check(&self) {
        let records = self.drain_idle();
        let checked = records.len();
        let mut retired = 0;

        for held in records {
            let connection = &held.record().connection;
            let healthy = match self.factory().health_check() {
                Some(probe) => probe.is_healthy(connection).await,
                None => self.factory().validate(connection).await.is_ok(),
            };
            self.stats().record_health_check(healthy);

            if healthy {
                self.restore_idle(held.take()).await;
            } else {
                debug!(connection_id = held.record().id, "Connection failed health check");
                self.retire(held.take(), RetireReason::Unhealthy).await;
                retired += 1;
            }
        }

        self.replenish().await;
        debug!(checked, retired, total = self.created_count(), "Health check sweep finished");
    }

    /// Retire idle connections past their lifetime, idle too long, or invalid
    pub(crate) async fn run_cleanup(&self) {
        let records = self.drain_idle();
        let checked = records.len();
        let policy = self.retirement_policy();
        let now = Instant::now();
        let mut retired = 0;

        for held in records {
            if let Some(reason) = policy.check_idle(held.record(), now) {
                self.retire(held.take(), reason).await;
                retired += 1;
                continue;
            }

            if let Err(e) = self.factory().validate(&held.record().connection).await {
                self.stats().record_validation_failure();
                debug!(connection_id = held.record().id, error = %e, "Idle connection failed validation");
                self.retire(held.take(), RetireReason::Invalid).await;
                retired += 1;
                continue;
            }

            self.restore_idle(held.take()).await;
        }

        self.replenish().await;
        debug!(checked, retired, total = self.created_count(), "Cleanup sweep finished");
    }

    /// Create idle connections until `min_connections` exist
    ///
    /// Best-effort: the first failure ends this round and the next sweep
    /// tries again.
    pub(crate) async fn replenish(&self) {
        let min = self.config().min_connections;
        let mut added = 0;

        while !self.is_closed() && self.created_count() < min {
            let Some(slot) = self.try_admit() else {
                break;
            };
            match self.open_connection(slot).await {
                Ok(record) => {
                    if let Err(record) = self.push_idle(record) {
                        warn!(connection_id = record.id, "Idle store full during replenishment");
                        self.retire(record, RetireReason::Overflow).await;
                        break;
                    }
                    added += 1;
                }
                Err(e) => {
                    warn!(error = %e, "Replenishment failed, retrying on next sweep");
                    break;
                }
            }
        }

        // A close racing with this loop may have drained the store already.
        if self.is_closed() {
            self.retire_all_idle(RetireReason::Closed).await;
        }

        if added > 0 {
            debug!(added, total = self.created_count(), "Replenished pool");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::METRICS_INTERVAL;
    use crate::config::PoolConfig;
    use crate::pool::ConnectionPool;
    use crate::testing::MockFactory;
    use std::time::Duration;

    fn config(min: usize, max: usize) -> PoolConfig {
        PoolConfig::new()
            .with_min_connections(min)
            .with_max_connections(max)
            .without_health_check()
            .with_metrics(false)
    }

    #[tokio::test]
    async fn test_health_check_retires_and_replenishes() {
        let factory = MockFactory::new();
        let pool = ConnectionPool::new(factory.clone(), config(2, 4)).await.unwrap();

        factory.mark_unhealthy(1);
        pool.run_health_check().await;

        let stats = pool.stats();
        assert_eq!(stats.health_checks, 2);
        assert_eq!(stats.health_check_failures, 1);
        assert_eq!(factory.closed(), 1);
        assert_eq!(factory.created(), 3);
        assert_eq!(pool.total_count(), 2);
        assert_eq!(pool.idle_count(), 2);
    }

    #[tokio::test]
    async fn test_health_check_falls_back_to_validate() {
        let factory = MockFactory::new().without_probe();
        let pool = ConnectionPool::new(factory.clone(), config(1, 2)).await.unwrap();

        factory.mark_invalid(1);
        pool.run_health_check().await;

        assert_eq!(pool.stats().health_check_failures, 1);
        assert_eq!(factory.closed(), 1);
        assert_eq!(pool.total_count(), 1);
    }

    #[tokio::test]
    async fn test_cleanup_retires_idle_connections() {
        let factory = MockFactory::new();
        let config = config(0, 3).with_max_idle_time(Duration::from_millis(20));
        let pool = ConnectionPool::new(factory.clone(), config).await.unwrap();

        let conn = pool.acquire().await.unwrap();
        pool.release(conn).await.unwrap();
        assert_eq!(pool.idle_count(), 1);

        tokio::time::sleep(Duration::from_millis(40)).await;
        pool.run_cleanup().await;

        assert_eq!(pool.idle_count(), 0);
        assert_eq!(pool.total_count(), 0);
        assert_eq!(factory.closed(), 1);
    }

    #[tokio::test]
    async fn test_cleanup_keeps_fresh_connections() {
        let factory = MockFactory::new();
        let pool = ConnectionPool::new(factory.clone(), config(2, 3)).await.unwrap();

        pool.run_cleanup().await;

        assert_eq!(pool.idle_count(), 2);
        assert_eq!(factory.closed(), 0);
    }

    #[tokio::test]
    async fn test_replenish_failure_is_absorbed() {
        let factory = MockFactory::new().fail_after(2);
        let pool = ConnectionPool::new(factory.clone(), config(2, 4)).await.unwrap();

        factory.mark_unhealthy(1);
        factory.mark_unhealthy(2);
        pool.run_health_check().await;

        assert_eq!(pool.total_count(), 0);
        assert_eq!(pool.stats().creation_errors, 1);
        assert!(!pool.health_status().is_healthy());
    }

    #[tokio::test]
    async fn test_workers_run_and_stop_on_close() {
        let factory = MockFactory::new();
        let config = config(1, 2)
            .with_health_check(Duration::from_millis(20))
            .with_metrics(true);
        let pool = ConnectionPool::new(factory.clone(), config).await.unwrap();

        tokio::time::sleep(Duration::from_millis(70)).await;
        assert!(pool.stats().health_checks >= 1);

        tokio::time::timeout(Duration::from_secs(1), pool.close())
            .await
            .expect("close should not hang")
            .unwrap();
        assert_eq!(factory.closed(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_metrics_worker_snapshots_gauges() {
        let config = config(2, 4).with_metrics(true);
        let pool = ConnectionPool::new(MockFactory::new(), config).await.unwrap();
        let conn = pool.acquire().await.unwrap();

        // Read without refreshing, so only the worker can fill these in.
        let before = pool.inner.stats().snapshot();
        assert_eq!(before.active_connections, 0);
        assert_eq!(before.total_connections, 0);

        tokio::time::sleep(METRICS_INTERVAL + Duration::from_millis(10)).await;

        let after = pool.inner.stats().snapshot();
        assert_eq!(after.active_connections, 1);
        assert_eq!(after.idle_connections, 1);
        assert_eq!(after.total_connections, 2);
        drop(conn);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gauges_stay_stale_without_metrics_worker() {
        let pool = ConnectionPool::new(MockFactory::new(), config(2, 4)).await.unwrap();

        tokio::time::sleep(METRICS_INTERVAL * 2).await;

        assert_eq!(pool.inner.stats().snapshot().total_connections, 0);
        assert_eq!(pool.stats().total_connections, 2);
    }
}
