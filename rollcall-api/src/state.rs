//! Shared governance state for Axum routers.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use rollcall_core::SharedClock;
use rollcall_storage::CachePolicy;

use crate::config::GovernanceConfig;
use crate::constants::DEFAULT_RATE_SWEEP_INTERVAL_SECS;
use crate::jobs::{spawn_sweeper, SweeperHandle, SweeperSnapshot};
use crate::middleware::{CacheLayerState, LockoutLayerState, RateLimitState, ThrottleState};
use crate::services::{LimiterPreset, LockoutTracker, RateWindow, ResponseCache, SpeedThrottle};
use crate::telemetry::RequestLogConfig;

/// Every governance service, built once at startup and shared by all
/// routes. Cloning is cheap.
#[derive(Clone)]
pub struct Governance {
    pub config: Arc<GovernanceConfig>,
    pub clock: SharedClock,
    pub cache: Arc<ResponseCache>,
    pub api_limiter: Arc<RateWindow>,
    pub auth_limiter: Arc<RateWindow>,
    pub password_reset_limiter: Arc<RateWindow>,
    pub registration_limiter: Arc<RateWindow>,
    pub throttle: Arc<SpeedThrottle>,
    pub lockout: Arc<LockoutTracker>,
    pub start_time: Instant,
    sweepers: Arc<Mutex<Vec<SweeperHandle>>>,
}

crate::impl_from_ref!(Arc<GovernanceConfig>, config);
crate::impl_from_ref!(Arc<ResponseCache>, cache);
crate::impl_from_ref!(Arc<LockoutTracker>, lockout);
crate::impl_from_ref!(Instant, start_time);

impl Governance {
    pub fn new(config: GovernanceConfig, clock: SharedClock) -> Self {
        let limiter = |preset| Arc::new(RateWindow::new(config.limiter(preset), clock.clone()));

        Self {
            cache: Arc::new(ResponseCache::new(config.cache(), clock.clone())),
            api_limiter: limiter(LimiterPreset::Api),
            auth_limiter: limiter(LimiterPreset::Auth),
            password_reset_limiter: limiter(LimiterPreset::PasswordReset),
            registration_limiter: limiter(LimiterPreset::Registration),
            throttle: Arc::new(SpeedThrottle::new(config.throttle(), clock.clone())),
            lockout: Arc::new(LockoutTracker::new(config.lockout(), clock.clone())),
            config: Arc::new(config),
            clock,
            start_time: Instant::now(),
            sweepers: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn rate_window(&self, preset: LimiterPreset) -> &Arc<RateWindow> {
        match preset {
            LimiterPreset::Api => &self.api_limiter,
            LimiterPreset::Auth => &self.auth_limiter,
            LimiterPreset::PasswordReset => &self.password_reset_limiter,
            LimiterPreset::Registration => &self.registration_limiter,
        }
    }

    /// Middleware state for one of the limiters.
    pub fn limiter(&self, preset: LimiterPreset) -> RateLimitState {
        RateLimitState {
            limiter: Arc::clone(self.rate_window(preset)),
            enabled: self.config.rate_limit_enabled,
            trust_proxy: self.config.trust_proxy,
        }
    }

    pub fn throttle_state(&self) -> ThrottleState {
        ThrottleState {
            throttle: Arc::clone(&self.throttle),
            enabled: self.config.rate_limit_enabled,
            trust_proxy: self.config.trust_proxy,
        }
    }

    /// Middleware state caching a route under `policy`.
    pub fn cached(&self, policy: CachePolicy) -> CacheLayerState {
        CacheLayerState::new(Arc::clone(&self.cache), policy)
    }

    pub fn lockout_layer(&self) -> LockoutLayerState {
        LockoutLayerState::new(Arc::clone(&self.lockout))
    }

    pub fn request_log(&self) -> RequestLogConfig {
        RequestLogConfig {
            slow_threshold: self.config.slow_request_threshold,
        }
    }

    /// Spawn one sweeper per service. Must run inside a Tokio runtime.
    /// Calling it again while sweepers are running does nothing.
    pub fn start_sweepers(&self) {
        let mut sweepers = self.sweepers.lock().unwrap_or_else(PoisonError::into_inner);
        if !sweepers.is_empty() {
            return;
        }

        let rate_interval = Duration::from_secs(DEFAULT_RATE_SWEEP_INTERVAL_SECS);
        sweepers.push(spawn_sweeper(
            Arc::clone(&self.cache),
            self.cache.config().sweep_interval,
        ));
        for preset in LimiterPreset::ALL {
            sweepers.push(spawn_sweeper(Arc::clone(self.rate_window(preset)), rate_interval));
        }
        sweepers.push(spawn_sweeper(Arc::clone(&self.throttle), rate_interval));
        sweepers.push(spawn_sweeper(
            Arc::clone(&self.lockout),
            self.lockout.config().sweep_interval,
        ));

        tracing::info!(count = sweepers.len(), "Governance sweepers started");
    }

    pub fn running_sweepers(&self) -> usize {
        self.sweepers.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Stop every sweeper and wait for them to finish.
    pub async fn shutdown(&self) -> Vec<SweeperSnapshot> {
        let handles: Vec<SweeperHandle> = {
            let mut sweepers = self.sweepers.lock().unwrap_or_else(PoisonError::into_inner);
            sweepers.drain(..).collect()
        };

        let mut snapshots = Vec::with_capacity(handles.len());
        for handle in handles {
            if let Some(snapshot) = handle.shutdown().await {
                snapshots.push(snapshot);
            }
        }
        tracing::info!(stopped = snapshots.len(), "Governance sweepers stopped");
        snapshots
    }
}
