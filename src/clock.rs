//! Time source
//!
//! Staleness and cache-age checks read time through [`Clock`] so tests can
//! advance it by hand.

use chrono::{DateTime, Duration, Utc};
use std::fmt::Debug;
use std::sync::RwLock;

pub trait Clock: Send + Sync + Debug {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    now: RwLock<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self { now: RwLock::new(start) }
    }

    pub fn advance_secs(&self, secs: i64) {
        let mut now = self.now.write().unwrap_or_else(|e| e.into_inner());
        *now += Duration::seconds(secs);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.read().unwrap_or_else(|e| e.into_inner())
    }
}

/// Whole seconds elapsed between two instants, clamped at zero
pub fn age_secs(now: DateTime<Utc>, then: DateTime<Utc>) -> i64 {
    (now - then).num_seconds().max(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_advances() {
        let clock = ManualClock::default();
        let start = clock.now();
        clock.advance_secs(61);
        assert_eq!(age_secs(clock.now(), start), 61);
    }

    #[test]
    fn test_age_never_negative() {
        let now = Utc::now();
        assert_eq!(age_secs(now, now + Duration::seconds(5)), 0);
    }
}
