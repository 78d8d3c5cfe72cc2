//! Governance Configuration Module
//!
//! Every knob of the governance layer (limiter windows and ceilings,
//! throttle thresholds, lockout policy, cache sizing, request logging and
//! CORS) is loaded from `ROLLCALL_*` environment variables with the defaults
//! in [`crate::constants`].

use std::str::FromStr;
use std::time::Duration;

use rollcall_storage::CacheStoreConfig;

use crate::constants::*;
use crate::services::{LimiterPreset, LockoutConfig, RateWindowConfig, SpeedThrottleConfig};

// ============================================================================
// GOVERNANCE CONFIGURATION
// ============================================================================

/// Configuration for every governance service.
#[derive(Debug, Clone, PartialEq)]
pub struct GovernanceConfig {
    // ========================================================================
    // Rate Limiting
    // ========================================================================
    /// Whether rate limiting is enabled.
    pub rate_limit_enabled: bool,

    /// Window length of the general API limiter.
    pub rate_limit_window: Duration,

    /// Requests admitted per window by the general API limiter.
    pub rate_limit_max_requests: u32,

    /// Key clients by `x-forwarded-for`/`x-real-ip` instead of the socket
    /// address. Only safe behind a reverse proxy that overwrites them.
    pub trust_proxy: bool,

    /// Failed credential attempts admitted per window.
    pub auth_rate_limit_max_requests: u32,

    // ========================================================================
    // Speed Throttle
    // ========================================================================
    pub slowdown_window: Duration,
    pub slowdown_delay_after: u32,
    pub slowdown_delay_step: Duration,
    pub slowdown_max_delay: Duration,

    // ========================================================================
    // Account Lockout
    // ========================================================================
    pub max_login_attempts: u32,
    pub lockout_duration: Duration,
    pub lockout_sweep_interval: Duration,

    // ========================================================================
    // Response Cache
    // ========================================================================
    pub cache_ttl: Duration,
    pub cache_max_entries: usize,
    pub cache_sweep_interval: Duration,

    // ========================================================================
    // Request Logging / CORS
    // ========================================================================
    /// Requests slower than this are logged at warn.
    pub slow_request_threshold: Duration,

    /// Allowed CORS origins. Empty allows any origin.
    pub cors_origins: Vec<String>,

    /// Bearer token guarding the cache admin routes. Unset leaves them
    /// unmounted.
    pub admin_token: Option<String>,
}

impl Default for GovernanceConfig {
    fn default() -> Self {
        Self {
            rate_limit_enabled: true,
            rate_limit_window: Duration::from_secs(DEFAULT_RATE_LIMIT_WINDOW_SECS),
            rate_limit_max_requests: DEFAULT_RATE_LIMIT_MAX_REQUESTS,
            auth_rate_limit_max_requests: DEFAULT_AUTH_RATE_LIMIT_MAX_REQUESTS,
            trust_proxy: DEFAULT_TRUST_PROXY,

            slowdown_window: Duration::from_secs(DEFAULT_SLOWDOWN_WINDOW_SECS),
            slowdown_delay_after: DEFAULT_SLOWDOWN_DELAY_AFTER,
            slowdown_delay_step: Duration::from_millis(DEFAULT_SLOWDOWN_DELAY_MS),
            slowdown_max_delay: Duration::from_millis(DEFAULT_SLOWDOWN_MAX_DELAY_MS),

            max_login_attempts: DEFAULT_MAX_LOGIN_ATTEMPTS,
            lockout_duration: Duration::from_secs(DEFAULT_LOCKOUT_DURATION_MINUTES * 60),
            lockout_sweep_interval: Duration::from_secs(DEFAULT_LOCKOUT_SWEEP_INTERVAL_SECS),

            cache_ttl: Duration::from_secs(DEFAULT_CACHE_TTL_SECS),
            cache_max_entries: DEFAULT_CACHE_MAX_ENTRIES,
            cache_sweep_interval: Duration::from_secs(DEFAULT_CACHE_SWEEP_INTERVAL_SECS),

            slow_request_threshold: Duration::from_millis(DEFAULT_SLOW_REQUEST_MS),
            cors_origins: Vec::new(),
            admin_token: None,
        }
    }
}

impl GovernanceConfig {
    /// Create GovernanceConfig from environment variables.
    ///
    /// Environment variables:
    /// - `ROLLCALL_RATE_LIMIT_ENABLED`: "true" or "false" (default: true)
    /// - `ROLLCALL_RATE_LIMIT_WINDOW_SECS`: API limiter window (default: 900)
    /// - `ROLLCALL_RATE_LIMIT_MAX_REQUESTS`: API limiter ceiling (default: 100)
    /// - `ROLLCALL_AUTH_RATE_LIMIT_MAX_REQUESTS`: failed logins per window (default: 5)
    /// - `ROLLCALL_TRUST_PROXY`: key clients by forwarding headers (default: false)
    /// - `ROLLCALL_SLOWDOWN_WINDOW_SECS`: throttle window (default: 900)
    /// - `ROLLCALL_SLOWDOWN_DELAY_AFTER`: free requests per window (default: 50)
    /// - `ROLLCALL_SLOWDOWN_DELAY_MS`: delay step (default: 500)
    /// - `ROLLCALL_SLOWDOWN_MAX_DELAY_MS`: delay cap (default: 5000)
    /// - `ROLLCALL_MAX_LOGIN_ATTEMPTS`: failures before lockout (default: 5)
    /// - `ROLLCALL_LOCKOUT_DURATION_MINUTES`: lock duration (default: 15)
    /// - `ROLLCALL_LOCKOUT_SWEEP_INTERVAL_SECS`: lockout sweep (default: 300)
    /// - `ROLLCALL_CACHE_TTL_SECS`: default cache TTL (default: 600)
    /// - `ROLLCALL_CACHE_MAX_ENTRIES`: cache capacity (default: 1000)
    /// - `ROLLCALL_CACHE_SWEEP_INTERVAL_SECS`: cache sweep (default: 120)
    /// - `ROLLCALL_SLOW_REQUEST_MS`: slow request threshold (default: 1000)
    /// - `ROLLCALL_CORS_ORIGINS`: comma-separated origins (empty = allow all)
    /// - `ROLLCALL_ADMIN_TOKEN`: bearer token for cache admin (unset = not mounted)
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let rate_limit_enabled = lookup("ROLLCALL_RATE_LIMIT_ENABLED")
            .map(|s| s.trim().to_lowercase() != "false")
            .unwrap_or(defaults.rate_limit_enabled);

        let trust_proxy = lookup("ROLLCALL_TRUST_PROXY")
            .map(|s| s.trim().eq_ignore_ascii_case("true"))
            .unwrap_or(defaults.trust_proxy);

        let admin_token = lookup("ROLLCALL_ADMIN_TOKEN")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        let cors_origins = lookup("ROLLCALL_CORS_ORIGINS")
            .map(|s| {
                s.split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Self {
            rate_limit_enabled,
            rate_limit_window: secs(&lookup, "ROLLCALL_RATE_LIMIT_WINDOW_SECS", DEFAULT_RATE_LIMIT_WINDOW_SECS),
            rate_limit_max_requests: parse_or(&lookup, "ROLLCALL_RATE_LIMIT_MAX_REQUESTS", DEFAULT_RATE_LIMIT_MAX_REQUESTS),
            auth_rate_limit_max_requests: parse_or(
                &lookup,
                "ROLLCALL_AUTH_RATE_LIMIT_MAX_REQUESTS",
                DEFAULT_AUTH_RATE_LIMIT_MAX_REQUESTS,
            ),
            trust_proxy,

            slowdown_window: secs(&lookup, "ROLLCALL_SLOWDOWN_WINDOW_SECS", DEFAULT_SLOWDOWN_WINDOW_SECS),
            slowdown_delay_after: parse_or(&lookup, "ROLLCALL_SLOWDOWN_DELAY_AFTER", DEFAULT_SLOWDOWN_DELAY_AFTER),
            slowdown_delay_step: millis(&lookup, "ROLLCALL_SLOWDOWN_DELAY_MS", DEFAULT_SLOWDOWN_DELAY_MS),
            slowdown_max_delay: millis(&lookup, "ROLLCALL_SLOWDOWN_MAX_DELAY_MS", DEFAULT_SLOWDOWN_MAX_DELAY_MS),

            max_login_attempts: parse_or(&lookup, "ROLLCALL_MAX_LOGIN_ATTEMPTS", DEFAULT_MAX_LOGIN_ATTEMPTS),
            lockout_duration: Duration::from_secs(
                parse_or(&lookup, "ROLLCALL_LOCKOUT_DURATION_MINUTES", DEFAULT_LOCKOUT_DURATION_MINUTES)
                    .saturating_mul(60),
            ),
            lockout_sweep_interval: secs(
                &lookup,
                "ROLLCALL_LOCKOUT_SWEEP_INTERVAL_SECS",
                DEFAULT_LOCKOUT_SWEEP_INTERVAL_SECS,
            ),

            cache_ttl: secs(&lookup, "ROLLCALL_CACHE_TTL_SECS", DEFAULT_CACHE_TTL_SECS),
            cache_max_entries: parse_or(&lookup, "ROLLCALL_CACHE_MAX_ENTRIES", DEFAULT_CACHE_MAX_ENTRIES),
            cache_sweep_interval: secs(&lookup, "ROLLCALL_CACHE_SWEEP_INTERVAL_SECS", DEFAULT_CACHE_SWEEP_INTERVAL_SECS),

            slow_request_threshold: millis(&lookup, "ROLLCALL_SLOW_REQUEST_MS", DEFAULT_SLOW_REQUEST_MS),
            cors_origins,
            admin_token,
        }
    }

    /// Limiter settings for a preset, with the configurable presets
    /// overridden from this configuration.
    pub fn limiter(&self, preset: LimiterPreset) -> RateWindowConfig {
        let config = preset.config();
        match preset {
            LimiterPreset::Api => RateWindowConfig {
                window: self.rate_limit_window,
                max_requests: self.rate_limit_max_requests,
                ..config
            },
            LimiterPreset::Auth => RateWindowConfig {
                max_requests: self.auth_rate_limit_max_requests,
                ..config
            },
            LimiterPreset::PasswordReset | LimiterPreset::Registration => config,
        }
    }

    pub fn throttle(&self) -> SpeedThrottleConfig {
        SpeedThrottleConfig {
            window: self.slowdown_window,
            delay_after: self.slowdown_delay_after,
            delay_step: self.slowdown_delay_step,
            max_delay: self.slowdown_max_delay,
        }
    }

    pub fn lockout(&self) -> LockoutConfig {
        LockoutConfig {
            max_attempts: self.max_login_attempts,
            lockout_duration: self.lockout_duration,
            sweep_interval: self.lockout_sweep_interval,
        }
    }

    pub fn cache(&self) -> CacheStoreConfig {
        CacheStoreConfig::new()
            .with_ttl(self.cache_ttl)
            .with_max_entries(self.cache_max_entries)
            .with_sweep_interval(self.cache_sweep_interval)
    }
}

// ============================================================================
// PARSING HELPERS
// ============================================================================

/// Parse `key` from the lookup, falling back to `default` when the variable
/// is unset or malformed. Malformed values are logged.
fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + Copy + std::fmt::Display,
{
    match lookup(key) {
        None => default,
        Some(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!(
                    variable = key,
                    value = %raw,
                    default = %default,
                    "Invalid configuration value, using default"
                );
                default
            }
        },
    }
}

fn secs<F>(lookup: &F, key: &str, default: u64) -> Duration
where
    F: Fn(&str) -> Option<String>,
{
    Duration::from_secs(parse_or(lookup, key, default))
}

fn millis<F>(lookup: &F, key: &str, default: u64) -> Duration
where
    F: Fn(&str) -> Option<String>,
{
    Duration::from_millis(parse_or(lookup, key, default))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = GovernanceConfig::default();
        assert!(config.rate_limit_enabled);
        assert_eq!(config.rate_limit_window, Duration::from_secs(900));
        assert_eq!(config.rate_limit_max_requests, 100);
        assert_eq!(config.auth_rate_limit_max_requests, 5);
        assert_eq!(config.slowdown_delay_after, 50);
        assert_eq!(config.slowdown_delay_step, Duration::from_millis(500));
        assert_eq!(config.slowdown_max_delay, Duration::from_secs(5));
        assert_eq!(config.max_login_attempts, 5);
        assert_eq!(config.lockout_duration, Duration::from_secs(15 * 60));
        assert_eq!(config.cache_ttl, Duration::from_secs(600));
        assert_eq!(config.cache_max_entries, 1000);
        assert_eq!(config.cache_sweep_interval, Duration::from_secs(120));
        assert!(config.cors_origins.is_empty());
        assert!(!config.trust_proxy);
        assert!(config.admin_token.is_none());
    }

    #[test]
    fn test_empty_lookup_matches_default() {
        let config = GovernanceConfig::from_lookup(|_| None);
        assert_eq!(config, GovernanceConfig::default());
    }

    #[test]
    fn test_overrides_are_applied() {
        let config = GovernanceConfig::from_lookup(lookup_from(&[
            ("ROLLCALL_RATE_LIMIT_ENABLED", "FALSE"),
            ("ROLLCALL_RATE_LIMIT_MAX_REQUESTS", "250"),
            ("ROLLCALL_LOCKOUT_DURATION_MINUTES", "30"),
            ("ROLLCALL_CACHE_MAX_ENTRIES", "64"),
            ("ROLLCALL_SLOWDOWN_DELAY_MS", "100"),
            ("ROLLCALL_CORS_ORIGINS", "https://school.example, ,https://admin.school.example"),
        ]));
        assert!(!config.rate_limit_enabled);
        assert_eq!(config.rate_limit_max_requests, 250);
        assert_eq!(config.lockout_duration, Duration::from_secs(1800));
        assert_eq!(config.cache_max_entries, 64);
        assert_eq!(config.slowdown_delay_step, Duration::from_millis(100));
        assert_eq!(
            config.cors_origins,
            vec!["https://school.example", "https://admin.school.example"]
        );
    }

    #[test]
    fn test_proxy_trust_and_admin_token() {
        let config = GovernanceConfig::from_lookup(lookup_from(&[
            ("ROLLCALL_TRUST_PROXY", "True"),
            ("ROLLCALL_ADMIN_TOKEN", " s3cret "),
        ]));
        assert!(config.trust_proxy);
        assert_eq!(config.admin_token.as_deref(), Some("s3cret"));

        let config = GovernanceConfig::from_lookup(lookup_from(&[
            ("ROLLCALL_TRUST_PROXY", "yes please"),
            ("ROLLCALL_ADMIN_TOKEN", "   "),
        ]));
        assert!(!config.trust_proxy);
        assert!(config.admin_token.is_none());
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = GovernanceConfig::from_lookup(lookup_from(&[
            ("ROLLCALL_RATE_LIMIT_MAX_REQUESTS", "lots"),
            ("ROLLCALL_CACHE_TTL_SECS", "-5"),
        ]));
        assert_eq!(config.rate_limit_max_requests, DEFAULT_RATE_LIMIT_MAX_REQUESTS);
        assert_eq!(config.cache_ttl, Duration::from_secs(DEFAULT_CACHE_TTL_SECS));
    }

    #[test]
    fn test_limiter_overrides_only_configurable_presets() {
        let config = GovernanceConfig::from_lookup(lookup_from(&[
            ("ROLLCALL_RATE_LIMIT_WINDOW_SECS", "60"),
            ("ROLLCALL_AUTH_RATE_LIMIT_MAX_REQUESTS", "10"),
        ]));
        assert_eq!(config.limiter(LimiterPreset::Api).window, Duration::from_secs(60));
        assert_eq!(config.limiter(LimiterPreset::Auth).max_requests, 10);
        assert!(config.limiter(LimiterPreset::Auth).failures_only);
        assert_eq!(
            config.limiter(LimiterPreset::Registration),
            LimiterPreset::Registration.config()
        );
    }

    #[test]
    fn test_cache_store_config() {
        let config = GovernanceConfig::default().cache();
        assert_eq!(config.default_ttl, Duration::from_secs(600));
        assert_eq!(config.max_entries, 1000);
    }
}
