//! Injected time source and expiry arithmetic.
//!
//! Every component that needs "now" receives an `Arc<dyn Clock>`. Expiry of
//! one-time codes, QR tokens and guardian-link requests is always evaluated at
//! the point of use against this clock; nothing in the crate schedules timers.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, PoisonError, RwLock};

/// Source of the current instant
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Current wall-clock time
    fn now(&self) -> DateTime<Utc>;
}

/// Production clock backed by the system time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Settable clock for tests and offline replays
///
/// Clones share the same instant, so a test can hold one handle and advance
/// time underneath the managers that hold the others.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<RwLock<DateTime<Utc>>>,
}

impl ManualClock {
    /// Create a clock frozen at `start`
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(RwLock::new(start)),
        }
    }

    /// Jump to an absolute instant
    pub fn set(&self, instant: DateTime<Utc>) {
        *self.now.write().unwrap_or_else(PoisonError::into_inner) = instant;
    }

    /// Move the clock forward by `by`
    pub fn advance(&self, by: Duration) {
        *self.now.write().unwrap_or_else(PoisonError::into_inner) += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.read().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Time left until an expiry instant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Remaining {
    pub ms: i64,
    pub seconds: i64,
    pub minutes: i64,
    pub is_expired: bool,
}

/// Compute the time remaining until `expires_at`.
///
/// `is_expired` is true exactly when `now >= expires_at`; the numeric fields
/// never go below zero.
pub fn remaining(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> Remaining {
    let left = (expires_at - now).max(Duration::zero());
    Remaining {
        ms: left.num_milliseconds(),
        seconds: left.num_seconds(),
        minutes: left.num_minutes(),
        is_expired: now >= expires_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, h, m, s).unwrap()
    }

    #[test]
    fn test_remaining_before_expiry() {
        let r = remaining(at(8, 5, 0), at(8, 1, 30));
        assert_eq!(r.ms, 210_000);
        assert_eq!(r.seconds, 210);
        assert_eq!(r.minutes, 3);
        assert!(!r.is_expired);
    }

    #[test]
    fn test_remaining_exactly_at_expiry_is_expired() {
        let r = remaining(at(8, 5, 0), at(8, 5, 0));
        assert!(r.is_expired, "now == expires_at must count as expired");
        assert_eq!(r.ms, 0);
    }

    #[test]
    fn test_remaining_after_expiry_clamps_to_zero() {
        let r = remaining(at(8, 5, 0), at(9, 0, 0));
        assert!(r.is_expired);
        assert_eq!(r.seconds, 0);
        assert_eq!(r.minutes, 0);
    }

    #[test]
    fn test_manual_clock_shared_between_clones() {
        let clock = ManualClock::new(at(7, 0, 0));
        let handle = clock.clone();
        handle.advance(Duration::minutes(50));
        assert_eq!(clock.now(), at(7, 50, 0));

        handle.set(at(12, 0, 0));
        assert_eq!(clock.now(), at(12, 0, 0));
    }
}
