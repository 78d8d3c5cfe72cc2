//! Constants for the Rollcall governance layer
//!
//! Every tunable default lives here so configuration, presets and tests agree
//! on the same numbers.

// ============================================================================
// RATE LIMITING
// ============================================================================

/// Default fixed-window length for the general API limiter (15 minutes)
pub const DEFAULT_RATE_LIMIT_WINDOW_SECS: u64 = 900;

/// Default request ceiling per window for the general API limiter
pub const DEFAULT_RATE_LIMIT_MAX_REQUESTS: u32 = 100;

/// Default ceiling of failed credential attempts per window
pub const DEFAULT_AUTH_RATE_LIMIT_MAX_REQUESTS: u32 = 5;

/// Window for password-reset and registration limiters (1 hour)
pub const SENSITIVE_LIMIT_WINDOW_SECS: u64 = 3600;

/// Ceiling for password-reset and registration limiters
pub const SENSITIVE_LIMIT_MAX_REQUESTS: u32 = 3;

/// Forwarding headers are ignored unless the deployment opts in
pub const DEFAULT_TRUST_PROXY: bool = false;

/// Sweep interval for expired rate counters
pub const DEFAULT_RATE_SWEEP_INTERVAL_SECS: u64 = 300;

// ============================================================================
// SPEED THROTTLE
// ============================================================================

/// Default throttle window (15 minutes)
pub const DEFAULT_SLOWDOWN_WINDOW_SECS: u64 = 900;

/// Requests per window served without delay
pub const DEFAULT_SLOWDOWN_DELAY_AFTER: u32 = 50;

/// Delay added per request beyond the free threshold
pub const DEFAULT_SLOWDOWN_DELAY_MS: u64 = 500;

/// Upper bound on the added delay
pub const DEFAULT_SLOWDOWN_MAX_DELAY_MS: u64 = 5000;

// ============================================================================
// ACCOUNT LOCKOUT
// ============================================================================

/// Failed attempts before an identity is locked
pub const DEFAULT_MAX_LOGIN_ATTEMPTS: u32 = 5;

/// Lock duration in minutes
pub const DEFAULT_LOCKOUT_DURATION_MINUTES: u64 = 15;

/// Sweep interval for lapsed lockout records (5 minutes)
pub const DEFAULT_LOCKOUT_SWEEP_INTERVAL_SECS: u64 = 300;

/// JSON body field carrying the credential identity
pub const DEFAULT_LOCKOUT_IDENTITY_FIELD: &str = "phoneNumber";

/// Largest credential request body buffered for identity extraction
pub const MAX_CREDENTIAL_BODY_BYTES: usize = 64 * 1024;

// ============================================================================
// RESPONSE CACHE
// ============================================================================

/// Default entry TTL (10 minutes)
pub const DEFAULT_CACHE_TTL_SECS: u64 = 600;

/// Maximum number of cached responses
pub const DEFAULT_CACHE_MAX_ENTRIES: usize = 1000;

/// Sweep interval for expired cache entries (2 minutes)
pub const DEFAULT_CACHE_SWEEP_INTERVAL_SECS: u64 = 120;

/// Response header reporting the cache outcome
pub const CACHE_STATUS_HEADER: &str = "x-cache";

// ============================================================================
// REQUEST LOGGING
// ============================================================================

/// Requests slower than this are logged at warn
pub const DEFAULT_SLOW_REQUEST_MS: u64 = 1000;

// ============================================================================
// SERVER
// ============================================================================

/// Default bind host
pub const DEFAULT_BIND_HOST: &str = "0.0.0.0";

/// Default listen port
pub const DEFAULT_PORT: u16 = 3000;

/// Shortest accepted sweep interval; tokio intervals reject zero
pub const MIN_SWEEP_INTERVAL_MS: u64 = 10;
