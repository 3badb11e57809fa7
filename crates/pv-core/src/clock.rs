//! Time sources for session windows.
//!
//! The store stamps `created_at` from its clock, and the tally engine uses it
//! when a caller does not pass an explicit `now`.

use std::fmt;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Duration, Utc};

/// A source of the current time.
pub trait Clock: Send + Sync + fmt::Debug {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves forward, and only when told to.
///
/// Used by scripted runs and tests to step past session deadlines without
/// sleeping. Time never goes backward, so a closed session stays closed.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub const fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Moves the clock forward and returns the new time.
    ///
    /// Returns `None`, leaving the clock where it was, when `by` is negative
    /// or the result falls outside the representable range.
    pub fn advance(&self, by: Duration) -> Option<DateTime<Utc>> {
        if by < Duration::zero() {
            return None;
        }
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now = now.checked_add_signed(by)?;
        Some(*now)
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
