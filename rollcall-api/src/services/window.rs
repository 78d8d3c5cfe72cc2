//! Fixed-window counters shared by [`RateWindow`] and [`SpeedThrottle`].
//!
//! Each client gets its own window anchored at its first request. When a
//! request arrives after the window has ended the counter is replaced, never
//! decayed.
//!
//! [`RateWindow`]: super::RateWindow
//! [`SpeedThrottle`]: super::SpeedThrottle

use std::time::Duration;

use dashmap::DashMap;
use rollcall_core::clock::{add_duration, remaining};
use rollcall_core::{ClientKey, SharedClock, Timestamp};

/// Request count for one client within one window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateCounter {
    /// Instant of the first request in the window.
    pub window_start: Timestamp,
    /// Requests counted so far in the window.
    pub count: u32,
}

impl RateCounter {
    fn fresh(now: Timestamp) -> Self {
        Self {
            window_start: now,
            count: 0,
        }
    }

    pub fn window_end(&self, window: Duration) -> Timestamp {
        add_duration(self.window_start, window)
    }

    pub fn is_expired(&self, now: Timestamp, window: Duration) -> bool {
        now >= self.window_end(window)
    }

    /// Whole seconds until the window ends, rounded up.
    pub fn reset_after_secs(&self, now: Timestamp, window: Duration) -> u64 {
        ceil_secs(remaining(now, self.window_end(window)))
    }
}

/// Per-client fixed-window counters.
pub struct WindowCounters {
    window: Duration,
    clock: SharedClock,
    counters: DashMap<ClientKey, RateCounter>,
}

impl WindowCounters {
    pub fn new(window: Duration, clock: SharedClock) -> Self {
        Self {
            window,
            clock,
            counters: DashMap::new(),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    /// Run `f` against the live counter for `key`, creating it or rolling it
    /// over first. The shard lock is held for the whole call, so `f` sees and
    /// mutates the counter atomically.
    pub fn update<R>(&self, key: &ClientKey, f: impl FnOnce(&mut RateCounter, Timestamp) -> R) -> R {
        let now = self.clock.now();
        let mut counter = self
            .counters
            .entry(key.clone())
            .or_insert_with(|| RateCounter::fresh(now));
        if counter.is_expired(now, self.window) {
            *counter = RateCounter::fresh(now);
        }
        f(&mut counter, now)
    }

    /// The counter `key` would see at `now`, without creating or rolling it.
    pub fn current(&self, key: &ClientKey, now: Timestamp) -> RateCounter {
        self.counters
            .get(key)
            .map(|counter| *counter)
            .filter(|counter| !counter.is_expired(now, self.window))
            .unwrap_or_else(|| RateCounter::fresh(now))
    }

    /// Remove counters whose window has ended.
    pub fn sweep_expired(&self) -> usize {
        let now = self.clock.now();
        let window = self.window;
        let mut removed = 0;
        self.counters.retain(|_, counter| {
            let keep = !counter.is_expired(now, window);
            if !keep {
                removed += 1;
            }
            keep
        });
        removed
    }

    pub fn len(&self) -> usize {
        self.counters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }
}

/// Round a duration up to whole seconds.
pub(crate) fn ceil_secs(duration: Duration) -> u64 {
    duration.as_secs() + u64::from(duration.subsec_nanos() > 0)
}
