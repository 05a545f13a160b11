//! Time capability.
//!
//! The unresolvable store's retry backoff is time-driven; abstracting the
//! clock keeps that policy deterministic under test.

use chrono::{DateTime, Utc};

/// Capability for reading the current time.
pub trait Clock: Send + Sync {
    /// Current UTC time.
    fn now(&self) -> DateTime<Utc>;

    /// Current Unix timestamp in seconds.
    fn timestamp(&self) -> i64 {
        self.now().timestamp()
    }
}

/// Production clock backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Controllable clock for tests.
#[cfg(any(test, feature = "test-utils"))]
#[derive(Debug, Default)]
pub struct FakeClock {
    seconds: std::sync::atomic::AtomicI64,
}

#[cfg(any(test, feature = "test-utils"))]
impl FakeClock {
    /// A fake clock starting at the Unix epoch.
    #[must_use]
    pub const fn epoch() -> Self {
        Self {
            seconds: std::sync::atomic::AtomicI64::new(0),
        }
    }

    /// A fake clock starting at the given time.
    #[must_use]
    pub fn at(time: DateTime<Utc>) -> Self {
        Self {
            seconds: std::sync::atomic::AtomicI64::new(time.timestamp()),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, duration: chrono::Duration) {
        self.seconds
            .fetch_add(duration.num_seconds(), std::sync::atomic::Ordering::SeqCst);
    }
}

#[cfg(any(test, feature = "test-utils"))]
impl Clock for FakeClock {
    fn now(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.seconds.load(std::sync::atomic::Ordering::SeqCst), 0)
            .unwrap_or_default()
    }
}
