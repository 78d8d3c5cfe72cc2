//! Injectable time sources.
//!
//! Every governance component reads time through [`Clock`] so expiry, window
//! rollover and lock release can be driven deterministically in tests by a
//! [`ManualClock`] instead of real sleeps.

use std::fmt;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{TimeZone, Utc};

use crate::identity::Timestamp;

/// Source of the current time.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Current wall-clock time in UTC.
    fn now(&self) -> Timestamp;
}

/// Shared, type-erased clock handed to every service.
pub type SharedClock = Arc<dyn Clock>;

/// Clock backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl SystemClock {
    /// Create a shared system clock.
    pub fn shared() -> SharedClock {
        Arc::new(SystemClock)
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Utc::now()
    }
}

/// Manually advanced clock for tests and simulations.
///
/// Time only moves when [`ManualClock::advance`] or [`ManualClock::set`] is
/// called.
#[derive(Debug)]
pub struct ManualClock {
    now: RwLock<Timestamp>,
}

impl ManualClock {
    /// Create a clock frozen at `start`.
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: RwLock::new(start),
        }
    }

    /// Create a clock frozen at the Unix epoch.
    pub fn at_epoch() -> Self {
        Self::new(Utc.timestamp_opt(0, 0).single().unwrap_or_default())
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        let delta = chrono::Duration::from_std(by).unwrap_or(chrono::Duration::MAX);
        let mut now = self
            .now
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *now = now.checked_add_signed(delta).unwrap_or(*now);
    }

    /// Move the clock forward by whole seconds.
    pub fn advance_secs(&self, secs: u64) {
        self.advance(Duration::from_secs(secs));
    }

    /// Jump to an absolute instant.
    pub fn set(&self, to: Timestamp) {
        let mut now = self
            .now
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *now = to;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::at_epoch()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        *self
            .now
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

/// Add a std duration to a timestamp, saturating at the far future.
pub fn add_duration(at: Timestamp, by: Duration) -> Timestamp {
    chrono::Duration::from_std(by)
        .ok()
        .and_then(|delta| at.checked_add_signed(delta))
        .unwrap_or(chrono::DateTime::<Utc>::MAX_UTC)
}

/// Time remaining from `now` until `until`, zero when already passed.
pub fn remaining(now: Timestamp, until: Timestamp) -> Duration {
    (until - now).to_std().unwrap_or(Duration::ZERO)
}
