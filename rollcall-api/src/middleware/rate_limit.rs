//! Fixed-window rate limiting middleware.
//!
//! Clients are keyed by IP. Admitted responses carry `ratelimit-limit`,
//! `ratelimit-remaining` and `ratelimit-reset`; rejections are 429 with
//! `retry-after` and the limiter's message.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, HeaderName, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use rollcall_core::ClientKey;

use crate::error::ApiError;
use crate::services::{RateDecision, RateWindow};

const RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("ratelimit-limit");
const RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("ratelimit-remaining");
const RATELIMIT_RESET: HeaderName = HeaderName::from_static("ratelimit-reset");

/// State for [`rate_limit_middleware`]. One per limiter.
#[derive(Clone)]
pub struct RateLimitState {
    pub limiter: Arc<RateWindow>,
    /// When false the middleware forwards every request untouched.
    pub enabled: bool,
    /// Key clients by forwarding headers instead of the socket address.
    pub trust_proxy: bool,
}

impl RateLimitState {
    pub fn new(limiter: Arc<RateWindow>) -> Self {
        Self {
            limiter,
            enabled: true,
            trust_proxy: false,
        }
    }

    pub fn disabled(limiter: Arc<RateWindow>) -> Self {
        Self {
            enabled: false,
            ..Self::new(limiter)
        }
    }

    pub fn with_trust_proxy(mut self, trust_proxy: bool) -> Self {
        self.trust_proxy = trust_proxy;
        self
    }
}

/// Rejection produced by [`rate_limit_middleware`].
#[derive(Debug)]
pub struct RateLimitError {
    pub decision: RateDecision,
    pub message: String,
}

impl IntoResponse for RateLimitError {
    fn into_response(self) -> Response {
        let mut response =
            ApiError::too_many_requests(self.message, self.decision.retry_after_secs).into_response();
        apply_rate_headers(response.headers_mut(), &self.decision);
        response
    }
}

/// Client identity for limiting.
///
/// The socket address is authoritative. Only behind a trusted reverse proxy
/// (`trust_proxy`) are `x-forwarded-for` (first hop) and `x-real-ip`
/// consulted, and then only when they parse as an IP address.
pub fn extract_client_ip(request: &Request, trust_proxy: bool) -> ClientKey {
    if trust_proxy {
        if let Some(ip) = forwarded_ip(request.headers()) {
            return ClientKey::from(ip);
        }
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| ClientKey::from(addr.ip()))
        .unwrap_or_else(|| ClientKey::from("unknown"))
}

fn forwarded_ip(headers: &HeaderMap) -> Option<IpAddr> {
    let header_ip = |name: &str, first_hop: bool| {
        let value = headers.get(name)?.to_str().ok()?;
        let value = if first_hop { value.split(',').next()? } else { value };
        value.trim().parse::<IpAddr>().ok()
    };

    header_ip("x-forwarded-for", true).or_else(|| header_ip("x-real-ip", false))
}

fn apply_rate_headers(headers: &mut HeaderMap, decision: &RateDecision) {
    for (name, value) in [
        (RATELIMIT_LIMIT, u64::from(decision.limit)),
        (RATELIMIT_REMAINING, u64::from(decision.remaining)),
        (RATELIMIT_RESET, decision.reset_after_secs),
    ] {
        headers.insert(name, HeaderValue::from(value));
    }
}

/// Rate limiting middleware.
///
/// Limiters configured with `failures_only` let the request through while
/// under the ceiling and count it only if the handler answered 4xx or 5xx.
pub async fn rate_limit_middleware(
    State(state): State<RateLimitState>,
    request: Request,
    next: Next,
) -> Result<Response, RateLimitError> {
    if !state.enabled {
        return Ok(next.run(request).await);
    }

    let key = extract_client_ip(&request, state.trust_proxy);
    let limiter = &state.limiter;
    let config = limiter.config();

    let reject = |decision: RateDecision| RateLimitError {
        decision,
        message: config.message.clone(),
    };

    let response = if config.failures_only {
        let decision = limiter.probe(&key);
        if !decision.allowed {
            return Err(reject(decision));
        }
        let mut response = next.run(request).await;
        let status = response.status();
        let decision = if status.is_client_error() || status.is_server_error() {
            limiter.charge(&key)
        } else {
            decision
        };
        apply_rate_headers(response.headers_mut(), &decision);
        response
    } else {
        let decision = limiter.admit(&key);
        if !decision.allowed {
            return Err(reject(decision));
        }
        let mut response = next.run(request).await;
        apply_rate_headers(response.headers_mut(), &decision);
        response
    };

    Ok(response)
}
