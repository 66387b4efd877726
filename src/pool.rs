//! Core connection pool implementation

use crate::config::{PoolConfig, validate_bounds};
use crate::errors::{PoolError, PoolResult};
use crate::eviction::{RetireReason, RetirementPolicy};
use crate::factory::ConnectionFactory;
use crate::guard::{Detached, Slot};
use crate::health::HealthStatus;
use crate::idle::{IdleStore, Wake};
use crate::maintenance;
use crate::metrics::{PoolEfficiency, PoolStatistics, StatsTracker, ratio};
use crate::record::{ConnectionRecord, PooledConnection};

use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Stand-in deadline for timeouts too large to add to `Instant::now()`
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365);

/// Shared state behind every [`ConnectionPool`] handle
///
/// `created`, `active` and `idle_count` are the only inputs to capacity
/// decisions. Statistics live behind their own lock and are never consulted
/// for admission.
pub(crate) struct PoolInner<F: ConnectionFactory> {
    factory: F,
    config: RwLock<PoolConfig>,
    idle: IdleStore<ConnectionRecord<F::Connection>>,
    created: AtomicUsize,
    active: AtomicUsize,
    idle_count: AtomicUsize,
    stats: StatsTracker,
    closed: AtomicBool,
    next_id: AtomicU64,
    shutdown: CancellationToken,
    workers: Mutex<Vec<JoinHandle<()>>>,
    resize_lock: tokio::sync::Mutex<()>,
}

impl<F: ConnectionFactory> PoolInner<F> {
    fn new(factory: F, config: PoolConfig) -> Self {
        Self {
            factory,
            idle: IdleStore::new(config.max_connections),
            config: RwLock::new(config),
            created: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            idle_count: AtomicUsize::new(0),
            stats: StatsTracker::new(),
            closed: AtomicBool::new(false),
            next_id: AtomicU64::new(1),
            shutdown: CancellationToken::new(),
            workers: Mutex::new(Vec::new()),
            resize_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub(crate) fn config(&self) -> PoolConfig {
        self.config.read().clone()
    }

    pub(crate) fn factory(&self) -> &F {
        &self.factory
    }

    pub(crate) fn stats(&self) -> &StatsTracker {
        &self.stats
    }

    pub(crate) fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub(crate) fn created_count(&self) -> usize {
        self.created.load(Ordering::Acquire)
    }

    pub(crate) fn retirement_policy(&self) -> RetirementPolicy {
        RetirementPolicy::from_config(&self.config.read())
    }

    /// Reserve a slot for a new connection
    ///
    /// Compare-and-increment on `created`, so two callers racing at the
    /// boundary cannot both get through. The slot is given back when the
    /// returned guard drops without being kept.
    pub(crate) fn try_admit(&self) -> Option<Slot<'_, F>> {
        let max = self.config.read().max_connections;
        self.created
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |created| {
                (created < max).then_some(created + 1)
            })
            .ok()
            .map(|_| Slot::new(self))
    }

    pub(crate) fn release_slot(&self) {
        self.created.fetch_sub(1, Ordering::AcqRel);
        self.idle.notify_capacity();
    }

    /// Create a connection into a slot reserved by `try_admit`
    ///
    /// On failure, or if this future is dropped mid-create, the slot is
    /// given back.
    pub(crate) async fn open_connection(&self, slot: Slot<'_, F>) -> PoolResult<ConnectionRecord<F::Connection>> {
        let timeout = self.config.read().connection_timeout;

        let error = match tokio::time::timeout(timeout, self.factory.create(timeout)).await {
            Ok(Ok(connection)) => {
                slot.keep();
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                self.stats.record_created();
                debug!(connection_id = id, "Created new connection");
                return Ok(ConnectionRecord::new(id, connection));
            }
            Ok(Err(e)) => e.to_string(),
            Err(_) => format!("timed out after {timeout:?}"),
        };

        drop(slot);
        self.stats.record_creation_error();
        debug!(error = %error, "Connection creation failed");
        Err(PoolError::Creation(error))
    }

    /// Close a connection that is no longer counted as idle or active
    pub(crate) async fn retire(&self, record: ConnectionRecord<F::Connection>, reason: RetireReason) {
        let id = record.id;
        let usage_count = record.usage_count;
        // Freed once the factory is done, or when this future is dropped.
        let slot = Slot::new(self);
        self.stats.record_destroyed();

        if let Err(e) = self.factory.close(record.connection).await {
            warn!(connection_id = id, error = %e, "Failed to close connection");
        }
        drop(slot);
        debug!(connection_id = id, usage_count, reason = %reason, "Retired connection");
    }

    /// Forget a connection without closing it, freeing its slot
    pub(crate) fn discard(&self, record: ConnectionRecord<F::Connection>) {
        self.release_slot();
        self.stats.record_destroyed();
        debug!(connection_id = record.id, "Discarded connection without closing it");
    }

    /// Account for a dropped connection when no runtime is available to close it
    pub(crate) fn abandon_record(&self, record: ConnectionRecord<F::Connection>) {
        self.active.fetch_sub(1, Ordering::AcqRel);
        self.discard(record);
    }

    pub(crate) fn pop_idle(&self) -> Option<ConnectionRecord<F::Connection>> {
        let record = self.idle.try_pop()?;
        self.idle_count.fetch_sub(1, Ordering::AcqRel);
        Some(record)
    }

    /// Offer a record to the idle store, getting it back if the store is full
    pub(crate) fn push_idle(
        &self,
        record: ConnectionRecord<F::Connection>,
    ) -> Result<(), ConnectionRecord<F::Connection>> {
        // Count first so the gauge never dips below what the store holds.
        self.idle_count.fetch_add(1, Ordering::AcqRel);
        self.idle.try_push(record).inspect_err(|_| {
            self.idle_count.fetch_sub(1, Ordering::AcqRel);
        })
    }

    /// Put a record back after a sweep, retiring it if there is no room
    pub(crate) async fn restore_idle(&self, record: ConnectionRecord<F::Connection>) {
        if let Err(record) = self.push_idle(record) {
            warn!(connection_id = record.id, "Idle store full, retiring connection");
            self.retire(record, RetireReason::Overflow).await;
        }
    }

    /// Take every idle record out of the store without waiting
    pub(crate) fn drain_idle(&self) -> Vec<Detached<'_, F>> {
        let drained = self.idle.drain();
        self.idle_count.fetch_sub(drained.len(), Ordering::AcqRel);
        drained
            .into_iter()
            .map(|record| Detached::new(self, record))
            .collect()
    }

    pub(crate) async fn retire_all_idle(&self, reason: RetireReason) -> usize {
        let drained = self.drain_idle();
        let count = drained.len();
        for held in drained {
            self.retire(held.take(), reason).await;
        }
        count
    }

    async fn acquire_record(
        &self,
        start: Instant,
        deadline: Instant,
    ) -> PoolResult<ConnectionRecord<F::Connection>> {
        let wait_until = tokio::time::Instant::from_std(deadline);

        loop {
            if self.is_closed() {
                return Err(PoolError::PoolClosed);
            }

            if let Some(record) = self.pop_idle() {
                return Ok(record);
            }

            if let Some(slot) = self.try_admit() {
                return self.open_connection(slot).await;
            }

            match self.idle.pop_until(wait_until).await {
                Wake::Ready(record) => {
                    self.idle_count.fetch_sub(1, Ordering::AcqRel);
                    return Ok(record);
                }
                Wake::Retry => continue,
                Wake::TimedOut => {
                    return Err(PoolError::Timeout(deadline.saturating_duration_since(start)));
                }
            }
        }
    }

    /// Return a checked-out record to the pool or retire it
    ///
    /// Dropping this future mid-validation discards the connection rather
    /// than leaving it uncounted.
    pub(crate) async fn release_record(&self, record: ConnectionRecord<F::Connection>) -> PoolResult<()> {
        self.active.fetch_sub(1, Ordering::AcqRel);
        let held = Detached::new(self, record);

        if self.is_closed() {
            self.retire(held.take(), RetireReason::Closed).await;
            return Err(PoolError::PoolClosed);
        }

        // Idle-time eviction belongs to the cleanup sweep; only lifetime and
        // validity are checked here.
        if self.retirement_policy().is_expired(held.record(), Instant::now()) {
            self.retire(held.take(), RetireReason::Expired).await;
            return Ok(());
        }

        if let Err(e) = self.factory.validate(&held.record().connection).await {
            self.stats.record_validation_failure();
            debug!(connection_id = held.record().id, error = %e, "Released connection failed validation");
            self.retire(held.take(), RetireReason::Invalid).await;
            return Ok(());
        }

        match self.push_idle(held.take()) {
            Ok(()) => {
                self.stats.record_release();
                // Close may have drained the store between the check above and the push.
                if self.is_closed() {
                    self.retire_all_idle(RetireReason::Closed).await;
                }
            }
            Err(record) => {
                warn!(connection_id = record.id, "Idle store full, retiring released connection");
                self.retire(record, RetireReason::Overflow).await;
            }
        }
        Ok(())
    }

    /// Pre-create `min_connections`; any failure undoes the whole warm-up
    async fn warm_up(&self) -> PoolResult<()> {
        let min = self.config.read().min_connections;
        let mut records = Vec::with_capacity(min);

        for _ in 0..min {
            let Some(slot) = self.try_admit() else {
                break;
            };
            match self.open_connection(slot).await {
                Ok(record) => records.push(Detached::new(self, record)),
                Err(e) => {
                    for held in records {
                        self.retire(held.take(), RetireReason::Closed).await;
                    }
                    return Err(e);
                }
            }
        }

        for held in records {
            self.restore_idle(held.take()).await;
        }
        Ok(())
    }

    /// Retire idle records until `created` fits under `max` or the store runs dry
    async fn trim_to(&self, max: usize) -> usize {
        let mut retired = 0;
        while self.created_count() > max {
            let Some(record) = self.pop_idle() else {
                break;
            };
            self.retire(record, RetireReason::Resized).await;
            retired += 1;
        }
        retired
    }

    /// Join the workers and retire what is left idle
    async fn finish_close(&self) -> usize {
        let workers = std::mem::take(&mut *self.workers.lock());
        for worker in workers {
            if let Err(e) = worker.await {
                warn!(error = %e, "Maintenance worker ended abnormally");
            }
        }

        let retired = self.retire_all_idle(RetireReason::Closed).await;
        self.snapshot_gauges();
        retired
    }

    pub(crate) fn snapshot_gauges(&self) {
        self.stats.update_gauges(
            self.active.load(Ordering::Acquire),
            self.idle_count.load(Ordering::Acquire),
            self.created.load(Ordering::Acquire),
        );
    }
}

impl<F: ConnectionFactory> Drop for PoolInner<F> {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Bounded, self-maintaining pool of connections produced by a [`ConnectionFactory`]
///
/// Handles are cheap to clone and share one pool. Background workers keep
/// the pool at `min_connections`, retire unhealthy, expired and long-idle
/// connections, and snapshot gauges, until [`ConnectionPool::close`] is
/// called.
///
/// # Examples
///
/// ```
/// use async_trait::async_trait;
/// use esox_connpool::{ConnectionFactory, ConnectionPool, PoolConfig};
/// use std::time::Duration;
///
/// struct Numbers;
///
/// #[async_trait]
/// impl ConnectionFactory for Numbers {
///     type Connection = u32;
///     type Error = std::io::Error;
///
///     async fn create(&self, _timeout: Duration) -> Result<u32, Self::Error> {
///         Ok(42)
///     }
///
///     async fn validate(&self, _conn: &u32) -> Result<(), Self::Error> {
///         Ok(())
///     }
///
///     async fn close(&self, _conn: u32) -> Result<(), Self::Error> {
///         Ok(())
///     }
/// }
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> esox_connpool::PoolResult<()> {
/// let pool = ConnectionPool::new(Numbers, PoolConfig::default()).await?;
///
/// let conn = pool.acquire().await?;
/// assert_eq!(*conn, 42);
/// pool.release(conn).await?;
///
/// pool.close().await?;
/// # Ok(())
/// # }
/// ```
pub struct ConnectionPool<F: ConnectionFactory> {
    pub(crate) inner: Arc<PoolInner<F>>,
}

impl<F: ConnectionFactory> Clone for ConnectionPool<F> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<F: ConnectionFactory> fmt::Debug for ConnectionPool<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("created", &self.total_count())
            .field("active", &self.active_count())
            .field("idle", &self.idle_count())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl<F: ConnectionFactory> ConnectionPool<F> {
    /// Create a pool, pre-creating `min_connections` connections
    ///
    /// Fails without leaking anything if the configuration is invalid or any
    /// of the initial connections cannot be created.
    pub async fn new(factory: F, config: PoolConfig) -> PoolResult<Self> {
        config.validate()?;

        let inner = Arc::new(PoolInner::new(factory, config));
        inner.warm_up().await?;

        let workers = maintenance::spawn_workers(&inner);
        *inner.workers.lock() = workers;

        let config = inner.config();
        info!(
            min_connections = config.min_connections,
            max_connections = config.max_connections,
            health_check = config.enable_health_check,
            metrics = config.enable_metrics,
            "Created connection pool"
        );

        Ok(Self { inner })
    }

    /// Get a connection, waiting up to the configured `acquire_timeout`
    pub async fn acquire(&self) -> PoolResult<PooledConnection<F>> {
        let timeout = self.inner.config.read().acquire_timeout;
        self.acquire_timeout(timeout).await
    }

    /// Get a connection, waiting at most `timeout`
    pub async fn acquire_timeout(&self, timeout: Duration) -> PoolResult<PooledConnection<F>> {
        let now = Instant::now();
        let deadline = now.checked_add(timeout).unwrap_or(now + FAR_FUTURE);
        self.acquire_until(deadline).await
    }

    /// Get a connection, waiting until `deadline`
    ///
    /// An idle connection is handed out immediately. Otherwise a new one is
    /// created if the pool is below `max_connections`. At capacity the call
    /// waits for a release and fails with [`PoolError::Timeout`] once the
    /// deadline passes; it never falls back to creating at that point.
    pub async fn acquire_until(&self, deadline: Instant) -> PoolResult<PooledConnection<F>> {
        if self.inner.is_closed() {
            return Err(PoolError::PoolClosed);
        }

        let start = Instant::now();
        let result = self.inner.acquire_record(start, deadline).await;
        let elapsed = start.elapsed();
        self.inner
            .stats
            .record_acquire(elapsed, matches!(result, Err(PoolError::Timeout(_))));

        let mut record = match result {
            Ok(record) => record,
            Err(e) => {
                debug!(error = %e, wait_ms = elapsed.as_millis() as u64, "Acquire failed");
                return Err(e);
            }
        };

        record.touch();
        self.inner.active.fetch_add(1, Ordering::AcqRel);
        debug!(
            connection_id = record.id,
            usage_count = record.usage_count,
            wait_ms = elapsed.as_millis() as u64,
            "Connection acquired"
        );

        Ok(PooledConnection::new(record, Arc::downgrade(&self.inner)))
    }

    /// Hand a connection back
    ///
    /// Expired or invalid connections are retired instead of pooled, as is
    /// anything released after [`ConnectionPool::close`], which also reports
    /// [`PoolError::PoolClosed`]. Never waits for room in the idle store.
    pub async fn release(&self, mut conn: PooledConnection<F>) -> PoolResult<()> {
        if !conn.belongs_to(&self.inner) {
            // Dropping it routes it back to the pool it came from.
            return Err(PoolError::ForeignConnection);
        }

        match conn.take_record() {
            Some(record) => self.inner.release_record(record).await,
            None => Ok(()),
        }
    }

    /// Change the pool bounds at runtime
    ///
    /// Shrinking retires idle connections until the pool fits or no idle
    /// connection is left; checked-out connections are never reclaimed, so
    /// the pool may stay above the new maximum until they come back, and the
    /// ones that find the idle store full on release are retired.
    /// Growing the minimum tops the pool up right away.
    pub async fn resize(&self, min_connections: usize, max_connections: usize) -> PoolResult<()> {
        validate_bounds(min_connections, max_connections)?;
        if self.inner.is_closed() {
            return Err(PoolError::PoolClosed);
        }

        let _guard = self.inner.resize_lock.lock().await;

        let (old_min, old_max) = {
            let mut config = self.inner.config.write();
            let old = (config.min_connections, config.max_connections);
            config.min_connections = min_connections;
            config.max_connections = max_connections;
            old
        };

        info!(
            old_min,
            old_max,
            min_connections,
            max_connections,
            "Resizing connection pool"
        );

        self.inner.idle.set_capacity(max_connections);

        if max_connections < old_max {
            let retired = self.inner.trim_to(max_connections).await;
            debug!(retired, created = self.inner.created_count(), "Trimmed idle connections");
        } else if max_connections > old_max {
            // Waiters blocked at the old capacity may create now.
            self.inner.idle.wake_all();
        }

        if min_connections > old_min {
            self.inner.replenish().await;
        }

        Ok(())
    }

    /// Stop the workers and retire every idle connection
    ///
    /// Waits for the maintenance workers to finish. Checked-out connections
    /// are retired when they are released. The shutdown runs on its own
    /// task, so it completes even if this future is dropped.
    pub async fn close(&self) -> PoolResult<()> {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return Err(PoolError::PoolClosed);
        }

        self.inner.shutdown.cancel();
        self.inner.idle.close();

        let inner = Arc::clone(&self.inner);
        match tokio::spawn(async move { inner.finish_close().await }).await {
            Ok(retired) => info!(
                retired,
                still_active = self.active_count(),
                "Closed connection pool"
            ),
            Err(e) => warn!(error = %e, "Pool shutdown task ended abnormally"),
        }
        Ok(())
    }

    /// Whether [`ConnectionPool::close`] has been called
    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    /// Current configuration
    pub fn config(&self) -> PoolConfig {
        self.inner.config()
    }

    /// Connections that currently exist
    pub fn total_count(&self) -> usize {
        self.inner.created_count()
    }

    /// Connections currently checked out
    pub fn active_count(&self) -> usize {
        self.inner.active.load(Ordering::Acquire)
    }

    /// Connections waiting in the idle store
    pub fn idle_count(&self) -> usize {
        self.inner.idle_count.load(Ordering::Acquire)
    }

    /// Statistics with freshly snapshotted gauges
    pub fn stats(&self) -> PoolStatistics {
        self.inner.snapshot_gauges();
        self.inner.stats.snapshot()
    }

    /// Active connections as a share of `max_connections`
    pub fn utilization(&self) -> f64 {
        let max = self.inner.config.read().max_connections;
        ratio(self.active_count() as u64, max as u64)
    }

    /// Hit rate, health rate, utilization and turnover
    pub fn efficiency(&self) -> PoolEfficiency {
        let stats = self.stats();
        PoolEfficiency {
            hit_rate: stats.hit_rate(),
            health_rate: stats.health_rate(),
            utilization: self.utilization(),
            turnover: stats.turnover(),
        }
    }

    /// Get health status
    pub fn health_status(&self) -> HealthStatus {
        let config = self.inner.config();
        let stats = self.stats();
        HealthStatus::new(
            stats.idle_connections,
            stats.active_connections,
            stats.total_connections,
            config.max_connections,
            config.min_connections,
            stats.creation_errors,
            stats.health_check_failures,
        )
    }

    /// Run one health-check sweep now
    pub async fn run_health_check(&self) {
        self.inner.run_health_check().await;
    }

    /// Run one cleanup sweep now
    pub async fn run_cleanup(&self) {
        self.inner.run_cleanup().await;
    }

    /// Export statistics in Prometheus format
    #[cfg(feature = "metrics")]
    pub fn export_metrics_prometheus(
        &self,
        pool_name: &str,
        tags: Option<&std::collections::HashMap<String, String>>,
    ) -> PoolResult<String> {
        crate::metrics::MetricsExporter::export_prometheus(&self.stats(), pool_name, tags)
    }
}
