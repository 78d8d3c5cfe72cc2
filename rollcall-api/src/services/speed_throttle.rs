//! Speed Throttle Service
//!
//! Slows clients down instead of rejecting them. Within its own window a
//! client's first `delay_after` requests run at full speed; each later request
//! waits `(count - delay_after) * delay_step`, capped at `max_delay`.

use std::time::Duration;

use rollcall_core::{ClientKey, SharedClock};

use super::window::WindowCounters;
use crate::constants::{
    DEFAULT_SLOWDOWN_DELAY_AFTER, DEFAULT_SLOWDOWN_DELAY_MS, DEFAULT_SLOWDOWN_MAX_DELAY_MS,
    DEFAULT_SLOWDOWN_WINDOW_SECS,
};
use crate::jobs::Sweepable;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeedThrottleConfig {
    pub window: Duration,
    /// Requests per window served without delay.
    pub delay_after: u32,
    /// Delay added for each request beyond the threshold.
    pub delay_step: Duration,
    /// Delay never exceeds this.
    pub max_delay: Duration,
}

impl Default for SpeedThrottleConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(DEFAULT_SLOWDOWN_WINDOW_SECS),
            delay_after: DEFAULT_SLOWDOWN_DELAY_AFTER,
            delay_step: Duration::from_millis(DEFAULT_SLOWDOWN_DELAY_MS),
            max_delay: Duration::from_millis(DEFAULT_SLOWDOWN_MAX_DELAY_MS),
        }
    }
}

impl SpeedThrottleConfig {
    /// Delay for the `count`-th request of a window (1-based).
    pub fn delay_for_count(&self, count: u32) -> Duration {
        let over = count.saturating_sub(self.delay_after);
        if over == 0 {
            return Duration::ZERO;
        }
        self.delay_step.saturating_mul(over).min(self.max_delay)
    }
}

pub struct SpeedThrottle {
    config: SpeedThrottleConfig,
    counters: WindowCounters,
}

impl SpeedThrottle {
    pub fn new(config: SpeedThrottleConfig, clock: SharedClock) -> Self {
        let counters = WindowCounters::new(config.window, clock);
        Self { config, counters }
    }

    pub fn config(&self) -> &SpeedThrottleConfig {
        &self.config
    }

    /// Count the request and return how long to hold it before forwarding.
    pub fn delay_for(&self, key: &ClientKey) -> Duration {
        let count = self.counters.update(key, |counter, _| {
            counter.count = counter.count.saturating_add(1);
            counter.count
        });

        let delay = self.config.delay_for_count(count);
        if !delay.is_zero() {
            tracing::debug!(
                client = %key,
                count,
                delay_ms = delay.as_millis() as u64,
                "Throttling client"
            );
        }
        delay
    }

    pub fn tracked_clients(&self) -> usize {
        self.counters.len()
    }

    pub fn sweep_expired(&self) -> usize {
        self.counters.sweep_expired()
    }
}

impl Sweepable for SpeedThrottle {
    fn component(&self) -> &str {
        "speed_throttle"
    }

    fn sweep_expired(&self) -> usize {
        SpeedThrottle::sweep_expired(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollcall_core::ManualClock;
    use std::sync::Arc;

    fn throttle() -> (Arc<ManualClock>, SpeedThrottle) {
        let clock = Arc::new(ManualClock::at_epoch());
        (clock.clone(), SpeedThrottle::new(SpeedThrottleConfig::default(), clock))
    }

    #[test]
    fn test_first_requests_are_free() {
        let (_clock, throttle) = throttle();
        let ip = ClientKey::from("ip1");
        for _ in 0..50 {
            assert_eq!(throttle.delay_for(&ip), Duration::ZERO);
        }
        assert_eq!(throttle.delay_for(&ip), Duration::from_millis(500));
        assert_eq!(throttle.delay_for(&ip), Duration::from_millis(1000));
    }

    #[test]
    fn test_delay_is_capped() {
        let config = SpeedThrottleConfig::default();
        assert_eq!(config.delay_for_count(60), Duration::from_secs(5));
        assert_eq!(config.delay_for_count(61), Duration::from_secs(5));
        assert_eq!(config.delay_for_count(u32::MAX), Duration::from_secs(5));
    }

    #[test]
    fn test_window_rollover_restores_full_speed() {
        let (clock, throttle) = throttle();
        let ip = ClientKey::from("ip1");
        for _ in 0..55 {
            throttle.delay_for(&ip);
        }
        assert!(throttle.delay_for(&ip) > Duration::ZERO);

        clock.advance_secs(900);
        assert_eq!(throttle.delay_for(&ip), Duration::ZERO);
    }

    #[test]
    fn test_zero_threshold_delays_from_first_request() {
        let config = SpeedThrottleConfig {
            delay_after: 0,
            ..Default::default()
        };
        assert_eq!(config.delay_for_count(1), Duration::from_millis(500));
    }
}
