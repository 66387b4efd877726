//! Error types for the connection pool

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    #[error("Invalid pool configuration: {0}")]
    Configuration(String),

    #[error("Failed to create connection: {0}")]
    Creation(String),

    #[error("Timed out after {0:?} waiting for a connection")]
    Timeout(std::time::Duration),

    #[error("Pool is closed")]
    PoolClosed,

    #[error("Connection does not belong to this pool")]
    ForeignConnection,

    #[error("Failed to export metrics: {0}")]
    Metrics(String),
}

pub type PoolResult<T> = Result<T, PoolError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_error_display() {
        assert_eq!(PoolError::PoolClosed.to_string(), "Pool is closed");
        assert_eq!(
            PoolError::Timeout(Duration::from_millis(100)).to_string(),
            "Timed out after 100ms waiting for a connection"
        );
        assert_eq!(
            PoolError::Creation("refused".to_string()).to_string(),
            "Failed to create connection: refused"
        );
    }
}
