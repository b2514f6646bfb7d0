//! Wall-clock source for exit times.
//!
//! Protocol deadlines run on the Tokio clock; fees run on the local wall
//! clock, because entry times in the ledger are local wall-clock values.

use chrono::{Local, NaiveDateTime, TimeDelta};
use std::sync::{Arc, Mutex, PoisonError};

/// Source of the current local date-time.
pub trait Clock: Send + Sync {
    /// Current local date-time, full precision.
    fn now(&self) -> NaiveDateTime;
}

/// The system's local clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// Clock that only moves when told to.
///
/// Clones share the same time.
///
/// ```
/// use chrono::{NaiveDate, TimeDelta};
/// use parkgate_settlement::{Clock, ManualClock};
///
/// let start = NaiveDate::from_ymd_opt(2024, 1, 1)
///     .unwrap()
///     .and_hms_opt(10, 0, 0)
///     .unwrap();
/// let clock = ManualClock::new(start);
///
/// clock.advance(TimeDelta::hours(2));
/// assert_eq!(clock.now(), start + TimeDelta::hours(2));
/// ```
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<NaiveDateTime>>,
}

impl ManualClock {
    /// Create a clock stopped at `start`.
    pub fn new(start: NaiveDateTime) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    /// Jump to `now`.
    pub fn set(&self, now: NaiveDateTime) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = now;
    }

    /// Move forward by `delta`.
    pub fn advance(&self, delta: TimeDelta) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += delta;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> NaiveDateTime {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
