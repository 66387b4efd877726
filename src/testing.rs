//! Counting factory shared by the unit tests

use crate::factory::ConnectionFactory;
use crate::health::HealthCheck;

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

#[derive(Debug)]
pub(crate) struct MockConnection {
    pub serial: u64,
}

#[derive(Debug, thiserror::Error)]
#[error("mock factory: {0}")]
pub(crate) struct MockError(&'static str);

#[derive(Default)]
struct Shared {
    created: AtomicU64,
    closed: AtomicU64,
    invalid: Mutex<HashSet<u64>>,
    unhealthy: Mutex<HashSet<u64>>,
}

#[derive(Clone)]
pub(crate) struct MockFactory {
    shared: Arc<Shared>,
    fail_after: Option<u64>,
    create_delay: Option<Duration>,
    validate_delay: Option<Duration>,
    probe: bool,
}

impl MockFactory {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared::default()),
            fail_after: None,
            create_delay: None,
            validate_delay: None,
            probe: true,
        }
    }

    /// Succeed `n` times, then fail every create
    pub fn fail_after(mut self, n: u64) -> Self {
        self.fail_after = Some(n);
        self
    }

    pub fn with_create_delay(mut self, delay: Duration) -> Self {
        self.create_delay = Some(delay);
        self
    }

    pub fn with_validate_delay(mut self, delay: Duration) -> Self {
        self.validate_delay = Some(delay);
        self
    }

    /// Do not expose the health-check capability
    pub fn without_probe(mut self) -> Self {
        self.probe = false;
        self
    }

    pub fn created(&self) -> u64 {
        self.shared.created.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> u64 {
        self.shared.closed.load(Ordering::SeqCst)
    }

    pub fn mark_invalid(&self, serial: u64) {
        self.shared.invalid.lock().insert(serial);
    }

    pub fn mark_unhealthy(&self, serial: u64) {
        self.shared.unhealthy.lock().insert(serial);
    }
}

#[async_trait]
impl ConnectionFactory for MockFactory {
    type Connection = MockConnection;
    type Error = MockError;

    async fn create(&self, _timeout: Duration) -> Result<MockConnection, MockError> {
        if let Some(delay) = self.create_delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(limit) = self.fail_after
            && self.created() >= limit
        {
            return Err(MockError("create refused"));
        }
        let serial = self.shared.created.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(MockConnection { serial })
    }

    async fn validate(&self, conn: &MockConnection) -> Result<(), MockError> {
        if let Some(delay) = self.validate_delay {
            tokio::time::sleep(delay).await;
        }
        if self.shared.invalid.lock().contains(&conn.serial) {
            return Err(MockError("invalid"));
        }
        Ok(())
    }

    async fn close(&self, _conn: MockConnection) -> Result<(), MockError> {
        self.shared.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn health_check(&self) -> Option<&dyn HealthCheck<MockConnection>> {
        if self.probe {
            Some(self as &dyn HealthCheck<MockConnection>)
        } else {
            None
        }
    }
}

#[async_trait]
impl HealthCheck<MockConnection> for MockFactory {
    async fn is_healthy(&self, conn: &MockConnection) -> bool {
        !self.shared.unhealthy.lock().contains(&conn.serial)
    }
}
