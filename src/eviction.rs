//! Retirement rules for pooled connections

use crate::config::PoolConfig;
use crate::record::ConnectionRecord;
use std::fmt;
use std::time::{Duration, Instant};

/// Why a connection was taken out of circulation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetireReason {
    /// Older than `max_lifetime`
    Expired,
    /// Sat in the idle store longer than `max_idle_time`
    Idle,
    /// Factory validation rejected it
    Invalid,
    /// Health probe reported it unhealthy
    Unhealthy,
    /// The idle store had no room for it
    Overflow,
    /// Trimmed by a shrinking resize
    Resized,
    /// The pool is closed
    Closed,
}

impl fmt::Display for RetireReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Expired => "expired",
            Self::Idle => "idle",
            Self::Invalid => "invalid",
            Self::Unhealthy => "unhealthy",
            Self::Overflow => "overflow",
            Self::Resized => "resized",
            Self::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// Time-based retirement checks
///
/// Release only applies the lifetime rule; the idle rule is evaluated by the
/// cleanup sweep, where `last_used_at` reflects real time spent in the idle
/// store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RetirementPolicy {
    pub max_lifetime: Duration,
    pub max_idle_time: Duration,
}

impl RetirementPolicy {
    pub fn from_config(config: &PoolConfig) -> Self {
        Self {
            max_lifetime: config.max_lifetime,
            max_idle_time: config.max_idle_time,
        }
    }

    pub fn is_expired<C>(&self, record: &ConnectionRecord<C>, now: Instant) -> bool {
        record.age(now) > self.max_lifetime
    }

    pub fn is_idle_too_long<C>(&self, record: &ConnectionRecord<C>, now: Instant) -> bool {
        record.idle_for(now) > self.max_idle_time
    }

    /// Lifetime and idle checks, in that order
    pub fn check_idle<C>(&self, record: &ConnectionRecord<C>, now: Instant) -> Option<RetireReason> {
        if self.is_expired(record, now) {
            Some(RetireReason::Expired)
        } else if self.is_idle_too_long(record, now) {
            Some(RetireReason::Idle)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(lifetime_ms: u64, idle_ms: u64) -> RetirementPolicy {
        RetirementPolicy {
            max_lifetime: Duration::from_millis(lifetime_ms),
            max_idle_time: Duration::from_millis(idle_ms),
        }
    }

    #[test]
    fn test_fresh_record_is_kept() {
        let record = ConnectionRecord::new(1, ());
        let now = Instant::now();
        assert_eq!(policy(1_000, 1_000).check_idle(&record, now), None);
    }

    #[test]
    fn test_lifetime_wins_over_idle() {
        let record = ConnectionRecord::new(1, ());
        let later = record.created_at + Duration::from_millis(50);
        assert_eq!(
            policy(10, 10).check_idle(&record, later),
            Some(RetireReason::Expired)
        );
    }

    #[test]
    fn test_idle_detected_before_lifetime() {
        let record = ConnectionRecord::new(1, ());
        let later = record.created_at + Duration::from_millis(50);
        assert_eq!(
            policy(10_000, 10).check_idle(&record, later),
            Some(RetireReason::Idle)
        );
    }

    #[test]
    fn test_touch_resets_idle_clock() {
        let mut record = ConnectionRecord::new(1, ());
        let p = policy(10_000, 20);
        record.touch();
        let soon = record.last_used_at + Duration::from_millis(5);
        assert!(!p.is_idle_too_long(&record, soon));
    }
}
