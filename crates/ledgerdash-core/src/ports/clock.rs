//! Clock port for expiry checks.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Utc};

/// Port for reading the current wall-clock time.
pub trait Clock: Send + Sync {
    /// Returns the current UTC timestamp.
    fn now(&self) -> DateTime<Utc>;

    /// Current time as whole seconds since the Unix epoch.
    fn epoch_seconds(&self) -> i64 {
        self.now().timestamp()
    }
}

/// The real system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    seconds: AtomicI64,
}

impl ManualClock {
    /// Create a clock stopped at the given epoch second.
    pub fn at(epoch_seconds: i64) -> Self {
        Self {
            seconds: AtomicI64::new(epoch_seconds),
        }
    }

    /// Create a clock stopped at the current system time.
    pub fn starting_now() -> Self {
        Self::at(Utc::now().timestamp())
    }

    pub fn set(&self, epoch_seconds: i64) {
        self.seconds.store(epoch_seconds, Ordering::SeqCst);
    }

    pub fn advance(&self, seconds: i64) {
        self.seconds.fetch_add(seconds, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.epoch_seconds(), 0).unwrap_or_default()
    }

    fn epoch_seconds(&self) -> i64 {
        self.seconds.load(Ordering::SeqCst)
    }
}
