//! Clock abstraction for determinism.

use chrono::{DateTime, Utc};

/// Abstraction over wall-clock time so timestamps on jobs, statuses and
/// combat records can be pinned in tests.
pub trait Clock: Send + Sync {
    /// Returns the current time.
    fn now(&self) -> DateTime<Utc>;
}

/// Production clock that delegates to the system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
