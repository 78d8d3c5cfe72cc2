//! Governance middleware for the Rollcall API
//!
//! - `rate_limit`: fixed-window limiting per client IP
//! - `throttle`: progressive delay past a free threshold
//! - `lockout`: per-identity lock after repeated credential failures
//! - `cache`: TTL response cache for read-only routes
//! - `admin`: bearer-token guard for cache administration
//!
//! # Middleware Order
//!
//! ```ignore
//! Router::new()
//!     .route("/api/auth/login", post(login))
//!     // Innermost: sees the handler status to record lockout outcomes
//!     .route_layer(middleware::from_fn_with_state(lockout_state, lockout_middleware))
//!     .route_layer(middleware::from_fn_with_state(auth_limiter, rate_limit_middleware))
//!     // Applied to every route
//!     .layer(middleware::from_fn_with_state(throttle_state, throttle_middleware))
//!     .layer(middleware::from_fn_with_state(api_limiter, rate_limit_middleware))
//!     // Outermost
//! ```

pub mod admin;
pub mod cache;
pub mod lockout;
pub mod rate_limit;
pub mod throttle;

pub use admin::{admin_guard_middleware, AdminGuard};
pub use cache::{describe_request, response_cache_middleware, CacheLayerState, CallerIdentity};
pub use lockout::{lockout_middleware, LockoutLayerState};
pub use rate_limit::{extract_client_ip, rate_limit_middleware, RateLimitError, RateLimitState};
pub use throttle::{throttle_middleware, ThrottleState};
