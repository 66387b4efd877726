//! Counting factory for the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use esox_connpool::{ConnectionFactory, HealthCheck};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug)]
pub struct TestConnection {
    pub serial: u64,
}

#[derive(Debug, thiserror::Error)]
#[error("test factory refused: {0}")]
pub struct TestError(pub String);

#[derive(Default)]
struct Counters {
    created: AtomicU64,
    closed: AtomicU64,
    failing: std::sync::atomic::AtomicBool,
    unhealthy: Mutex<HashSet<u64>>,
}

/// Factory that counts every create and close
#[derive(Clone, Default)]
pub struct CountingFactory {
    counters: Arc<Counters>,
}

impl CountingFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn created(&self) -> u64 {
        self.counters.created.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> u64 {
        self.counters.closed.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, failing: bool) {
        self.counters.failing.store(failing, Ordering::SeqCst);
    }

    pub fn mark_unhealthy(&self, serial: u64) {
        self.counters.unhealthy.lock().unwrap().insert(serial);
    }
}

#[async_trait]
impl ConnectionFactory for CountingFactory {
    type Connection = TestConnection;
    type Error = TestError;

    async fn create(&self, _timeout: Duration) -> Result<TestConnection, TestError> {
        if self.counters.failing.load(Ordering::SeqCst) {
            return Err(TestError("failing".to_string()));
        }
        let serial = self.counters.created.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(TestConnection { serial })
    }

    async fn validate(&self, _conn: &TestConnection) -> Result<(), TestError> {
        Ok(())
    }

    async fn close(&self, _conn: TestConnection) -> Result<(), TestError> {
        self.counters.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn health_check(&self) -> Option<&dyn HealthCheck<TestConnection>> {
        Some(self as &dyn HealthCheck<TestConnection>)
    }
}

#[async_trait]
impl HealthCheck<TestConnection> for CountingFactory {
    async fn is_healthy(&self, conn: &TestConnection) -> bool {
        !self.counters.unhealthy.lock().unwrap().contains(&conn.serial)
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
