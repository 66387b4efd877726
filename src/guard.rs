//! Scoped ownership of capacity slots and records in flight
//!
//! Every `.await` in the pool is a point where the caller may drop the
//! future. Anything reserved before such a point lives in one of these
//! guards, so a dropped future gives the slot back instead of leaking it.

use crate::factory::ConnectionFactory;
use crate::pool::PoolInner;
use crate::record::ConnectionRecord;

/// One unit of `created`, handed back on drop unless kept
pub(crate) struct Slot<'a, F: ConnectionFactory> {
    pool: &'a PoolInner<F>,
    held: bool,
}

impl<'a, F: ConnectionFactory> Slot<'a, F> {
    pub fn new(pool: &'a PoolInner<F>) -> Self {
        Self { pool, held: true }
    }

    /// The slot now belongs to a live connection
    pub fn keep(mut self) {
        self.held = false;
    }
}

impl<F: ConnectionFactory> Drop for Slot<'_, F> {
    fn drop(&mut self) {
        if self.held {
            self.pool.release_slot();
        }
    }
}

/// A record that is neither idle nor active while the pool works on it
///
/// Dropped without [`Detached::take`], the connection is discarded and its
/// slot released.
pub(crate) struct Detached<'a, F: ConnectionFactory> {
    pool: &'a PoolInner<F>,
    record: Option<ConnectionRecord<F::Connection>>,
}

impl<'a, F: ConnectionFactory> Detached<'a, F> {
    pub fn new(pool: &'a PoolInner<F>, record: ConnectionRecord<F::Connection>) -> Self {
        Self {
            pool,
            record: Some(record),
        }
    }

    pub fn record(&self) -> &ConnectionRecord<F::Connection> {
        self.record.as_ref().expect("record already taken")
    }

    pub fn take(mut self) -> ConnectionRecord<F::Connection> {
        self.record.take().expect("record already taken")
    }
}

impl<F: ConnectionFactory> Drop for Detached<'_, F> {
    fn drop(&mut self) {
        if let Some(record) = self.record.take() {
            self.pool.discard(record);
        }
    }
}
