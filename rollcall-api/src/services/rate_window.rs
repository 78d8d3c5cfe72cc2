//! Rate Window Service
//!
//! Fixed-window request limiter keyed by client. A client may make
//! `max_requests` requests per window; the next one is rejected with the
//! number of seconds until its window ends.
//!
//! Limiters configured with `failures_only` do not count every request.
//! The middleware calls [`RateWindow::probe`] before the handler and
//! [`RateWindow::charge`] only when the handler reported a failure, so
//! successful logins never consume the budget.

use std::time::Duration;

use rollcall_core::{ClientKey, GovernanceError, GovernanceResult, SharedClock};

use super::window::{RateCounter, WindowCounters};
use crate::constants::{
    DEFAULT_AUTH_RATE_LIMIT_MAX_REQUESTS, DEFAULT_RATE_LIMIT_MAX_REQUESTS,
    DEFAULT_RATE_LIMIT_WINDOW_SECS, SENSITIVE_LIMIT_MAX_REQUESTS, SENSITIVE_LIMIT_WINDOW_SECS,
};
use crate::jobs::Sweepable;
use crate::telemetry::metrics;

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Settings for one limiter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateWindowConfig {
    /// Limiter name, used in logs and metric labels.
    pub name: String,
    /// Window length.
    pub window: Duration,
    /// Requests admitted per window.
    pub max_requests: u32,
    /// Count only requests whose handler failed.
    pub failures_only: bool,
    /// Message returned to rejected clients.
    pub message: String,
}

/// Limiters the school backend applies to its route groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LimiterPreset {
    /// Every API route.
    Api,
    /// Login; counts failed attempts only.
    Auth,
    PasswordReset,
    Registration,
}

impl LimiterPreset {
    pub const ALL: [LimiterPreset; 4] = [
        LimiterPreset::Api,
        LimiterPreset::Auth,
        LimiterPreset::PasswordReset,
        LimiterPreset::Registration,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            LimiterPreset::Api => "api",
            LimiterPreset::Auth => "auth",
            LimiterPreset::PasswordReset => "password_reset",
            LimiterPreset::Registration => "registration",
        }
    }

    pub fn config(&self) -> RateWindowConfig {
        let (window_secs, max_requests, failures_only, message) = match self {
            LimiterPreset::Api => (
                DEFAULT_RATE_LIMIT_WINDOW_SECS,
                DEFAULT_RATE_LIMIT_MAX_REQUESTS,
                false,
                "Too many requests from this IP, please try again later.",
            ),
            LimiterPreset::Auth => (
                DEFAULT_RATE_LIMIT_WINDOW_SECS,
                DEFAULT_AUTH_RATE_LIMIT_MAX_REQUESTS,
                true,
                "Too many login attempts. Please try again after 15 minutes.",
            ),
            LimiterPreset::PasswordReset => (
                SENSITIVE_LIMIT_WINDOW_SECS,
                SENSITIVE_LIMIT_MAX_REQUESTS,
                false,
                "Too many password reset attempts. Please try again after 1 hour.",
            ),
            LimiterPreset::Registration => (
                SENSITIVE_LIMIT_WINDOW_SECS,
                SENSITIVE_LIMIT_MAX_REQUESTS,
                false,
                "Too many accounts created from this IP. Please try again after 1 hour.",
            ),
        };

        RateWindowConfig {
            name: self.name().to_string(),
            window: Duration::from_secs(window_secs),
            max_requests,
            failures_only,
            message: message.to_string(),
        }
    }
}

// ============================================================================
// DECISION
// ============================================================================

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    /// Window ceiling.
    pub limit: u32,
    /// Requests left in the current window.
    pub remaining: u32,
    /// Seconds to wait before retrying; zero when allowed.
    pub retry_after_secs: u64,
    /// Seconds until the current window ends.
    pub reset_after_secs: u64,
}

impl RateDecision {
    /// Convert a rejection into the corresponding governance error.
    pub fn into_result(self) -> GovernanceResult<RateDecision> {
        if self.allowed {
            Ok(self)
        } else {
            Err(GovernanceError::RateExceeded {
                retry_after_secs: self.retry_after_secs,
            })
        }
    }
}

// ============================================================================
// SERVICE
// ============================================================================

/// Fixed-window limiter, one instance per limiter preset.
pub struct RateWindow {
    config: RateWindowConfig,
    counters: WindowCounters,
}

impl RateWindow {
    pub fn new(config: RateWindowConfig, clock: SharedClock) -> Self {
        let counters = WindowCounters::new(config.window, clock);
        Self { config, counters }
    }

    pub fn from_preset(preset: LimiterPreset, clock: SharedClock) -> Self {
        Self::new(preset.config(), clock)
    }

    pub fn config(&self) -> &RateWindowConfig {
        &self.config
    }

    /// Count the request and decide whether it is admitted.
    ///
    /// A rejected request is not counted.
    pub fn admit(&self, key: &ClientKey) -> RateDecision {
        let max = self.config.max_requests;
        let decision = self.counters.update(key, |counter, now| {
            let allowed = counter.count < max;
            if allowed {
                counter.count += 1;
            }
            self.decide(counter, now, allowed)
        });

        if !decision.allowed {
            self.rejected(key, &decision);
        }
        decision
    }

    /// Decide whether a request would be admitted, without counting it.
    pub fn probe(&self, key: &ClientKey) -> RateDecision {
        let now = self.counters.now();
        let counter = self.counters.current(key, now);
        let decision = self.decide(&counter, now, counter.count < self.config.max_requests);

        if !decision.allowed {
            self.rejected(key, &decision);
        }
        decision
    }

    /// Count one request against the window regardless of the ceiling.
    pub fn charge(&self, key: &ClientKey) -> RateDecision {
        self.counters.update(key, |counter, now| {
            counter.count = counter.count.saturating_add(1);
            self.decide(counter, now, true)
        })
    }

    /// Requests counted for `key` in its current window.
    pub fn count(&self, key: &ClientKey) -> u32 {
        self.counters.current(key, self.counters.now()).count
    }

    /// Number of clients with a counter (expired or not).
    pub fn tracked_clients(&self) -> usize {
        self.counters.len()
    }

    /// Remove counters whose window has ended.
    pub fn sweep_expired(&self) -> usize {
        self.counters.sweep_expired()
    }

    fn decide(&self, counter: &RateCounter, now: rollcall_core::Timestamp, allowed: bool) -> RateDecision {
        let reset_after_secs = counter.reset_after_secs(now, self.config.window);
        RateDecision {
            allowed,
            limit: self.config.max_requests,
            remaining: self.config.max_requests.saturating_sub(counter.count),
            retry_after_secs: if allowed { 0 } else { reset_after_secs.max(1) },
            reset_after_secs,
        }
    }

    fn rejected(&self, key: &ClientKey, decision: &RateDecision) {
        tracing::warn!(
            limiter = %self.config.name,
            client = %key,
            limit = decision.limit,
            retry_after_secs = decision.retry_after_secs,
            "Rate limit exceeded"
        );
        if let Some(m) = metrics() {
            m.record_rate_limited(&self.config.name);
        }
    }
}

impl Sweepable for RateWindow {
    fn component(&self) -> &str {
        &self.config.name
    }

    fn sweep_expired(&self) -> usize {
        RateWindow::sweep_expired(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollcall_core::ManualClock;
    use std::sync::Arc;

    fn limiter(max_requests: u32, window_secs: u64) -> (Arc<ManualClock>, RateWindow) {
        let clock = Arc::new(ManualClock::at_epoch());
        let config = RateWindowConfig {
            window: Duration::from_secs(window_secs),
            max_requests,
            ..LimiterPreset::Api.config()
        };
        (clock.clone(), RateWindow::new(config, clock))
    }

    #[test]
    fn test_ceiling_then_reject_with_retry_after() {
        let (clock, limiter) = limiter(5, 60);
        let ip = ClientKey::from("ip1");

        for expected_remaining in (0..5).rev() {
            let decision = limiter.admit(&ip);
            assert!(decision.allowed);
            assert_eq!(decision.remaining, expected_remaining);
        }

        clock.advance_secs(20);
        let rejected = limiter.admit(&ip);
        assert!(!rejected.allowed);
        assert_eq!(rejected.retry_after_secs, 40);
        assert_eq!(limiter.count(&ip), 5, "rejections are not counted");
    }

    #[test]
    fn test_rollover_resets_budget() {
        let (clock, limiter) = limiter(2, 60);
        let ip = ClientKey::from("ip1");
        limiter.admit(&ip);
        limiter.admit(&ip);
        assert!(!limiter.admit(&ip).allowed);

        clock.advance_secs(60);
        let decision = limiter.admit(&ip);
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 1);
    }

    #[test]
    fn test_retry_after_is_at_least_one_second() {
        let (clock, limiter) = limiter(1, 60);
        let ip = ClientKey::from("ip1");
        limiter.admit(&ip);
        clock.advance(Duration::from_millis(59_999));
        let decision = limiter.admit(&ip);
        assert!(!decision.allowed);
        assert_eq!(decision.retry_after_secs, 1);
    }

    #[test]
    fn test_clients_are_independent() {
        let (_clock, limiter) = limiter(1, 60);
        assert!(limiter.admit(&ClientKey::from("a")).allowed);
        assert!(limiter.admit(&ClientKey::from("b")).allowed);
        assert!(!limiter.admit(&ClientKey::from("a")).allowed);
    }

    #[test]
    fn test_probe_and_charge() {
        let (_clock, limiter) = limiter(2, 60);
        let ip = ClientKey::from("ip1");

        assert!(limiter.probe(&ip).allowed);
        assert_eq!(limiter.count(&ip), 0, "probe never counts");
        assert_eq!(limiter.tracked_clients(), 0);

        limiter.charge(&ip);
        limiter.charge(&ip);
        let decision = limiter.probe(&ip);
        assert!(!decision.allowed);
        assert_eq!(decision.remaining, 0);
        assert!(decision.into_result().is_err());
    }

    #[test]
    fn test_zero_ceiling_rejects_everything() {
        let (_clock, limiter) = limiter(0, 60);
        assert!(!limiter.admit(&ClientKey::from("ip1")).allowed);
    }

    #[test]
    fn test_sweep_removes_finished_windows() {
        let (clock, limiter) = limiter(5, 60);
        limiter.admit(&ClientKey::from("a"));
        clock.advance_secs(61);
        limiter.admit(&ClientKey::from("b"));
        assert_eq!(limiter.sweep_expired(), 1);
        assert_eq!(limiter.tracked_clients(), 1);
    }

    #[test]
    fn test_presets() {
        let auth = LimiterPreset::Auth.config();
        assert_eq!(auth.max_requests, 5);
        assert!(auth.failures_only);
        assert_eq!(auth.window, Duration::from_secs(900));

        let reset = LimiterPreset::PasswordReset.config();
        assert_eq!(reset.max_requests, 3);
        assert_eq!(reset.window, Duration::from_secs(3600));

        let api = LimiterPreset::Api.config();
        assert_eq!(api.max_requests, 100);
        assert!(!api.failures_only);

        let names: Vec<_> = LimiterPreset::ALL.iter().map(LimiterPreset::name).collect();
        assert_eq!(names, ["api", "auth", "password_reset", "registration"]);
    }
}
