//! Bounded store of idle connections

use crossbeam::queue::SegQueue;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::Notify;
use tokio::time::Instant;

/// Outcome of waiting on the idle store
#[derive(Debug)]
pub(crate) enum Wake<T> {
    /// A record was popped
    Ready(T),
    /// Woken without a record: capacity freed, the pool closed, or another
    /// waiter won the race. The caller should re-evaluate.
    Retry,
    /// The deadline passed
    TimedOut,
}

/// Idle connections waiting to be handed out
///
/// This is both the set of available records and the signal that wakes
/// blocked acquirers. Every successful push wakes one waiter; freed capacity
/// (a retirement) wakes one waiter so it can try to create; closing the pool
/// wakes all of them. Pushes and pops never block, and a push into a full
/// store hands the record back so the caller can retire it.
///
/// The bound follows `max_connections` and moves with it on resize. A slot
/// in `len` is reserved before the push, so `len` never undercounts.
pub(crate) struct IdleStore<T> {
    queue: SegQueue<T>,
    len: AtomicUsize,
    capacity: AtomicUsize,
    available: Notify,
    closed: AtomicBool,
}

impl<T> IdleStore<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: SegQueue::new(),
            len: AtomicUsize::new(0),
            capacity: AtomicUsize::new(capacity),
            available: Notify::new(),
            closed: AtomicBool::new(false),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity.load(Ordering::Acquire)
    }

    /// Change the bound; records already above a lower bound stay until popped
    pub fn set_capacity(&self, capacity: usize) {
        self.capacity.store(capacity, Ordering::Release);
    }

    pub fn try_pop(&self) -> Option<T> {
        let item = self.queue.pop()?;
        self.len.fetch_sub(1, Ordering::AcqRel);
        Some(item)
    }

    /// Push without blocking; a full store returns the record
    pub fn try_push(&self, item: T) -> Result<(), T> {
        let capacity = self.capacity();
        let reserved = self
            .len
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |len| {
                (len < capacity).then_some(len + 1)
            });
        if reserved.is_err() {
            return Err(item);
        }

        self.queue.push(item);
        self.available.notify_one();
        Ok(())
    }

    /// Take everything currently in the store without waiting for more
    pub fn drain(&self) -> Vec<T> {
        let mut drained = Vec::with_capacity(self.queue.len());
        while let Some(item) = self.try_pop() {
            drained.push(item);
        }
        drained
    }

    /// Wake one waiter because a slot for a new connection opened up
    pub fn notify_capacity(&self) {
        self.available.notify_one();
    }

    /// Wake every waiter so each one re-evaluates
    pub fn wake_all(&self) {
        self.available.notify_waiters();
    }

    /// Stop parking waiters and wake the ones already parked
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.wake_all();
    }

    /// Pop a record, waiting until `deadline` for one to arrive
    pub async fn pop_until(&self, deadline: Instant) -> Wake<T> {
        let notified = self.available.notified();
        tokio::pin!(notified);
        // Register before checking the queue so a push in between is not missed.
        notified.as_mut().enable();

        if let Some(item) = self.try_pop() {
            return Wake::Ready(item);
        }
        if self.closed.load(Ordering::SeqCst) {
            return Wake::Retry;
        }

        match tokio::time::timeout_at(deadline, notified).await {
            Ok(()) => match self.try_pop() {
                Some(item) => Wake::Ready(item),
                None => Wake::Retry,
            },
            Err(_) => Wake::TimedOut,
        }
    }
}
