//! Pooled connection records and the handle lent out to callers

use crate::factory::ConnectionFactory;
use crate::pool::PoolInner;

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

/// A connection together with its lifecycle metadata
pub(crate) struct ConnectionRecord<C> {
    pub id: u64,
    pub connection: C,
    pub created_at: Instant,
    pub last_used_at: Instant,
    pub usage_count: u64,
}

impl<C> ConnectionRecord<C> {
    pub fn new(id: u64, connection: C) -> Self {
        let now = Instant::now();
        Self {
            id,
            connection,
            created_at: now,
            last_used_at: now,
            usage_count: 0,
        }
    }

    /// Mark the record as handed out
    pub fn touch(&mut self) {
        self.last_used_at = Instant::now();
        self.usage_count += 1;
    }

    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.created_at)
    }

    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_used_at)
    }
}

/// A connection checked out of a [`ConnectionPool`](crate::ConnectionPool)
///
/// Hand it back with [`ConnectionPool::release`](crate::ConnectionPool::release).
/// Dropping it instead sends it through the same release path on the current
/// tokio runtime.
pub struct PooledConnection<F: ConnectionFactory> {
    record: Option<ConnectionRecord<F::Connection>>,
    owner: Weak<PoolInner<F>>,
}

impl<F: ConnectionFactory> PooledConnection<F> {
    pub(crate) fn new(record: ConnectionRecord<F::Connection>, owner: Weak<PoolInner<F>>) -> Self {
        Self {
            record: Some(record),
            owner,
        }
    }

    fn record(&self) -> &ConnectionRecord<F::Connection> {
        self.record.as_ref().expect("record already released")
    }

    /// The underlying connection
    pub fn connection(&self) -> &F::Connection {
        &self.record().connection
    }

    /// Mutable access to the underlying connection
    pub fn connection_mut(&mut self) -> &mut F::Connection {
        &mut self.record.as_mut().expect("record already released").connection
    }

    /// Pool-unique identifier of the connection
    pub fn id(&self) -> u64 {
        self.record().id
    }

    /// When the connection was created
    pub fn created_at(&self) -> Instant {
        self.record().created_at
    }

    /// When the connection was last handed out
    pub fn last_used_at(&self) -> Instant {
        self.record().last_used_at
    }

    /// How many times the connection has been handed out, this time included
    pub fn usage_count(&self) -> u64 {
        self.record().usage_count
    }

    pub(crate) fn belongs_to(&self, pool: &Arc<PoolInner<F>>) -> bool {
        Weak::ptr_eq(&self.owner, &Arc::downgrade(pool))
    }

    pub(crate) fn take_record(&mut self) -> Option<ConnectionRecord<F::Connection>> {
        self.record.take()
    }
}

impl<F: ConnectionFactory> Deref for PooledConnection<F> {
    type Target = F::Connection;

    fn deref(&self) -> &Self::Target {
        self.connection()
    }
}

impl<F: ConnectionFactory> DerefMut for PooledConnection<F> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.connection_mut()
    }
}

impl<F: ConnectionFactory> fmt::Debug for PooledConnection<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("PooledConnection");
        if let Some(record) = &self.record {
            s.field("id", &record.id)
                .field("created_at", &record.created_at)
                .field("last_used_at", &record.last_used_at)
                .field("usage_count", &record.usage_count);
        }
        s.finish()
    }
}

impl<F: ConnectionFactory> Drop for PooledConnection<F> {
    fn drop(&mut self) {
        let Some(record) = self.record.take() else {
            return;
        };
        let Some(pool) = self.owner.upgrade() else {
            // The pool is gone; nothing left to account for.
            return;
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    // A closed pool retires it; there is no caller to report to.
                    let _ = pool.release_record(record).await;
                });
            }
            Err(_) => pool.abandon_record(record),
        }
    }
}
