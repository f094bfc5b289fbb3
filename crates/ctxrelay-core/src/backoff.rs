//! Retry delay policy for the ingest loop.
//!
//! `Fixed` retries forever at the poll interval. `Exponential` doubles the
//! delay per consecutive failure up to a cap. Both modes report themselves
//! *tripped* after `trip_after` consecutive failures; the first success resets.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Consecutive failures before the backoff counts as tripped.
pub const DEFAULT_TRIP_AFTER: u32 = 5;

/// How the retry delay grows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum RetryMode {
    Fixed,
    Exponential { max_ms: u64 },
}

impl Default for RetryMode {
    fn default() -> Self {
        Self::Fixed
    }
}

/// Stateful backoff tracker, owned by one loop.
#[derive(Debug, Clone)]
pub struct Backoff {
    mode: RetryMode,
    base: Duration,
    trip_after: u32,
    failures: u32,
}

impl Backoff {
    pub fn new(mode: RetryMode, base: Duration) -> Self {
        Self {
            mode,
            base,
            trip_after: DEFAULT_TRIP_AFTER,
            failures: 0,
        }
    }

    pub fn with_trip_after(mut self, n: u32) -> Self {
        self.trip_after = n.max(1);
        self
    }

    /// Record a failure and return the delay before the next attempt.
    pub fn fail(&mut self) -> Duration {
        self.failures = self.failures.saturating_add(1);
        self.current_delay()
    }

    /// Record a success. Returns `true` if the backoff was tripped before.
    pub fn succeed(&mut self) -> bool {
        let was_tripped = self.is_tripped();
        self.failures = 0;
        was_tripped
    }

    /// Consecutive failures so far.
    pub fn failures(&self) -> u32 {
        self.failures
    }

    pub fn is_tripped(&self) -> bool {
        self.failures >= self.trip_after
    }

    /// Returns `true` exactly on the failure that trips the backoff.
    pub fn just_tripped(&self) -> bool {
        self.failures == self.trip_after
    }

    fn current_delay(&self) -> Duration {
        match self.mode {
            RetryMode::Fixed => self.base,
            RetryMode::Exponential { max_ms } => {
                let exp = self.failures.saturating_sub(1).min(20);
                let base_ms = self.base.as_millis() as u64;
                let grown = base_ms.saturating_mul(1u64 << exp);
                Duration::from_millis(grown.min(max_ms.max(base_ms)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_mode_never_grows() {
        let mut b = Backoff::new(RetryMode::Fixed, Duration::from_millis(2000));
        for _ in 0..10 {
            assert_eq!(b.fail(), Duration::from_millis(2000));
        }
        assert!(b.is_tripped());
    }

    #[test]
    fn exponential_doubles_and_caps() {
        let mut b = Backoff::new(
            RetryMode::Exponential { max_ms: 500 },
            Duration::from_millis(100),
        );
        assert_eq!(b.fail().as_millis(), 100);
        assert_eq!(b.fail().as_millis(), 200);
        assert_eq!(b.fail().as_millis(), 400);
        assert_eq!(b.fail().as_millis(), 500);
        assert_eq!(b.fail().as_millis(), 500);
    }

    #[test]
    fn trips_and_resets() {
        let mut b = Backoff::new(RetryMode::Fixed, Duration::from_millis(10)).with_trip_after(2);
        b.fail();
        assert!(!b.is_tripped());
        b.fail();
        assert!(b.just_tripped());
        b.fail();
        assert!(b.is_tripped() && !b.just_tripped());
        assert!(b.succeed());
        assert_eq!(b.failures(), 0);
        assert!(!b.succeed());
    }
}
