//! Rollcall API - Request Governance Layer
//!
//! Sits in front of the school backend's HTTP routes and decides, per
//! request, whether to serve a cached response, reject the caller for
//! exceeding a rate limit, slow the caller down, or refuse a login for a
//! locked account. The domain handlers themselves stay untouched.
//!
//! All governance state is in memory and per process. Expired entries are
//! removed by background sweepers (see [`jobs`]).

pub mod config;
pub mod constants;
pub mod error;
pub mod jobs;
pub mod macros;
pub mod middleware;
pub mod routes;
pub mod services;
pub mod state;
pub mod telemetry;

// Re-export commonly used types
pub use config::GovernanceConfig;
pub use error::{ApiError, ApiResult, ErrorCode};
pub use middleware::{
    admin_guard_middleware, extract_client_ip, lockout_middleware, rate_limit_middleware,
    response_cache_middleware, throttle_middleware, AdminGuard, CacheLayerState, CallerIdentity,
    LockoutLayerState, RateLimitState, ThrottleState,
};
pub use routes::GovernedRouterBuilder;
pub use services::{
    LimiterPreset, LockoutConfig, LockoutState, LockoutStatus, LockoutTracker, RateWindow,
    RateWindowConfig, ResponseCache, SpeedThrottle, SpeedThrottleConfig,
};
pub use state::Governance;
