//! Router assembly
//!
//! The school backend supplies its domain routers; [`GovernedRouterBuilder`]
//! wraps them with the governance stack and adds the operational endpoints:
//!
//! - `GET /health`
//! - `GET /metrics` (Prometheus text format)
//! - `/api/cache/*` cache administration, only when mounted with a guard

pub mod cache_admin;
pub mod health;

use std::time::Duration;

use axum::{
    http::{header, header::HeaderName, HeaderValue, Method},
    middleware::from_fn_with_state,
    routing::get,
    Router,
};
use tower_http::cors::{Any, CorsLayer};

use crate::config::GovernanceConfig;
use crate::constants::CACHE_STATUS_HEADER;
use crate::middleware::{
    admin_guard_middleware, lockout_middleware, rate_limit_middleware, throttle_middleware,
    AdminGuard,
};
use crate::services::LimiterPreset;
use crate::state::Governance;
use crate::telemetry::{metrics_handler, request_logger_middleware};

pub use cache_admin::create_router as cache_admin_router;
pub use health::create_router as health_router;

const CORS_MAX_AGE_SECS: u64 = 3600;

/// Builder for the governed application router.
///
/// Every route under `/api` passes the API limiter and the speed throttle.
/// Credential routes additionally pass their own limiter; login routes also
/// pass account lockout. Routers handed in must already have their state
/// applied and contain at least one route.
pub struct GovernedRouterBuilder {
    governance: Governance,
    api: Router,
}

impl GovernedRouterBuilder {
    pub fn new(governance: Governance) -> Self {
        Self {
            governance,
            api: Router::new(),
        }
    }

    /// Mount cache administration at `/api/cache`. `guard` wraps the admin
    /// router, typically with [`admin_guard_middleware`] or the host's own
    /// auth layer.
    ///
    /// [`admin_guard_middleware`]: crate::middleware::admin_guard_middleware
    pub fn cache_admin_routes<G>(mut self, guard: G) -> Self
    where
        G: FnOnce(Router) -> Router,
    {
        let admin = guard(cache_admin::create_router(self.governance.clone()));
        self.api = self.api.nest("/api/cache", admin);
        self
    }

    /// [`cache_admin_routes`](Self::cache_admin_routes) behind a bearer token.
    pub fn cache_admin_with_token(self, token: &str) -> Self {
        let guard = AdminGuard::new(token);
        self.cache_admin_routes(|admin| {
            admin.route_layer(from_fn_with_state(guard, admin_guard_middleware))
        })
    }

    /// Ordinary domain routes. Paths are used as given, so include `/api`.
    pub fn domain_routes(mut self, routes: Router) -> Self {
        self.api = self.api.merge(routes);
        self
    }

    /// Login routes: failed attempts are limited per IP and locked per
    /// identity.
    pub fn login_routes(mut self, routes: Router) -> Self {
        let routes = routes
            .route_layer(from_fn_with_state(
                self.governance.lockout_layer(),
                lockout_middleware,
            ))
            .route_layer(from_fn_with_state(
                self.governance.limiter(LimiterPreset::Auth),
                rate_limit_middleware,
            ));
        self.api = self.api.merge(routes);
        self
    }

    /// Routes guarded by one of the sensitive limiters (password reset,
    /// registration).
    pub fn limited_routes(mut self, preset: LimiterPreset, routes: Router) -> Self {
        let routes = routes.route_layer(from_fn_with_state(
            self.governance.limiter(preset),
            rate_limit_middleware,
        ));
        self.api = self.api.merge(routes);
        self
    }

    /// Build the complete router.
    ///
    /// # Middleware Order (outer to inner)
    /// 1. CORS
    /// 2. Request logger
    /// 3. API rate limit (only `/api`)
    /// 4. Speed throttle (only `/api`)
    /// 5. Route-specific limiter, lockout and cache
    pub fn build(self) -> Router {
        let api = self
            .api
            .layer(from_fn_with_state(self.governance.throttle_state(), throttle_middleware))
            .layer(from_fn_with_state(
                self.governance.limiter(LimiterPreset::Api),
                rate_limit_middleware,
            ));

        let cors = build_cors_layer(&self.governance.config);

        Router::new()
            .merge(health::create_router(self.governance.clone()))
            .route("/metrics", get(metrics_handler))
            .merge(api)
            .layer(from_fn_with_state(
                self.governance.request_log(),
                request_logger_middleware,
            ))
            .layer(cors)
    }
}

/// Empty origins allow any origin.
fn build_cors_layer(config: &GovernanceConfig) -> CorsLayer {
    let exposed = [
        HeaderName::from_static("ratelimit-limit"),
        HeaderName::from_static("ratelimit-remaining"),
        HeaderName::from_static("ratelimit-reset"),
        header::RETRY_AFTER,
        HeaderName::from_static(CACHE_STATUS_HEADER),
    ];

    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT])
        .expose_headers(exposed)
        .max_age(Duration::from_secs(CORS_MAX_AGE_SECS));

    if config.cors_origins.is_empty() {
        tracing::info!("CORS: allowing all origins");
        cors.allow_origin(Any)
    } else {
        tracing::info!(origins = ?config.cors_origins, "CORS: restricting origins");
        let origins: Vec<HeaderValue> = config
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        cors.allow_origin(origins)
    }
}
