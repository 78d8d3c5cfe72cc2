//! End-to-end tests for the governed router
//!
//! Drives the full middleware stack with `tower::ServiceExt::oneshot`:
//! API limiting, failure-only login limiting, account lockout, response
//! caching, cache administration and the operational endpoints.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{Request, StatusCode},
    middleware::from_fn_with_state,
    response::Response,
    routing::{get, post},
    Json, Router,
};
use rollcall_api::{
    response_cache_middleware, Governance, GovernanceConfig, GovernedRouterBuilder, LimiterPreset,
};
use rollcall_core::ManualClock;
use rollcall_storage::CachePolicy;
use rollcall_test_utils::fixtures;
use serde_json::{json, Value};
use tower::ServiceExt;

type TestResult = Result<(), String>;

struct TestApp {
    clock: Arc<ManualClock>,
    governance: Governance,
    router: Router,
    roster_calls: Arc<AtomicUsize>,
}

/// The harness keys clients by `x-forwarded-for`, as behind a proxy.
fn build_app(config: GovernanceConfig) -> TestApp {
    build_app_with(
        GovernanceConfig {
            trust_proxy: true,
            ..config
        },
        |builder| builder,
    )
}

fn build_app_with(
    config: GovernanceConfig,
    extend: impl FnOnce(GovernedRouterBuilder) -> GovernedRouterBuilder,
) -> TestApp {
    let clock = fixtures::manual_clock();
    let governance = Governance::new(config, clock.clone());
    let roster_calls = Arc::new(AtomicUsize::new(0));

    let calls = Arc::clone(&roster_calls);
    let roster = move || {
        let calls = Arc::clone(&calls);
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Json(json!({ "success": true, "classes": ["7A", "7B"] }))
        }
    };

    let classes = Router::new()
        .route("/api/class/all", get(roster.clone()).post(roster))
        .route_layer(from_fn_with_state(
            governance.cached(CachePolicy::medium()),
            response_cache_middleware,
        ));

    let login = Router::new().route(
        "/api/auth/login",
        post(|Json(body): Json<Value>| async move {
            if body["password"] == "correct-horse" {
                (StatusCode::OK, Json(json!({ "success": true })))
            } else {
                (StatusCode::UNAUTHORIZED, Json(json!({ "success": false })))
            }
        }),
    );

    let register = Router::new().route(
        "/api/auth/register",
        post(|| async { (StatusCode::CREATED, Json(json!({ "success": true }))) }),
    );

    let builder = GovernedRouterBuilder::new(governance.clone())
        .domain_routes(classes)
        .login_routes(login)
        .limited_routes(LimiterPreset::Registration, register);
    let router = extend(builder).build();

    TestApp {
        clock,
        governance,
        router,
        roster_calls,
    }
}

fn get_from(uri: &str, ip: &str) -> Result<Request<Body>, String> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .header("x-forwarded-for", ip)
        .body(Body::empty())
        .map_err(|e| e.to_string())
}

fn login_from(phone: &str, password: &str, ip: &str) -> Result<Request<Body>, String> {
    Request::builder()
        .method("POST")
        .uri("/api/auth/login")
        .header("x-forwarded-for", ip)
        .header("content-type", "application/json")
        .body(Body::from(fixtures::login_body(phone, password)))
        .map_err(|e| e.to_string())
}

fn request(method: &str, uri: &str) -> Result<Request<Body>, String> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("x-forwarded-for", "10.0.0.1")
        .body(Body::empty())
        .map_err(|e| e.to_string())
}

async fn send(router: &Router, request: Request<Body>) -> Result<Response, String> {
    router.clone().oneshot(request).await.map_err(|e| e.to_string())
}

async fn json_body(response: Response) -> Result<Value, String> {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .map_err(|e| e.to_string())?;
    serde_json::from_slice(&bytes).map_err(|e| e.to_string())
}

fn header<'a>(response: &'a Response, name: &str) -> Option<&'a str> {
    response.headers().get(name).and_then(|v| v.to_str().ok())
}

// ============================================================================
// RATE LIMITING
// ============================================================================

#[tokio::test]
async fn test_api_limit_rejects_with_retry_after() -> TestResult {
    let app = build_app(GovernanceConfig {
        rate_limit_max_requests: 3,
        ..GovernanceConfig::default()
    });

    for expected_remaining in ["2", "1", "0"] {
        let response = send(&app.router, get_from("/api/class/all", "10.0.0.1")?).await?;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(header(&response, "ratelimit-limit"), Some("3"));
        assert_eq!(header(&response, "ratelimit-remaining"), Some(expected_remaining));
    }

    let rejected = send(&app.router, get_from("/api/class/all", "10.0.0.1")?).await?;
    assert_eq!(rejected.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(header(&rejected, "retry-after"), Some("900"));
    let body = json_body(rejected).await?;
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "TOO_MANY_REQUESTS");

    // Other clients keep their own budget.
    let other = send(&app.router, get_from("/api/class/all", "10.0.0.2")?).await?;
    assert_eq!(other.status(), StatusCode::OK);

    // A new window starts once the old one ends.
    app.clock.advance_secs(900);
    let renewed = send(&app.router, get_from("/api/class/all", "10.0.0.1")?).await?;
    assert_eq!(renewed.status(), StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn test_forwarded_for_is_ignored_without_proxy_trust() -> TestResult {
    let app = build_app_with(
        GovernanceConfig {
            rate_limit_max_requests: 1,
            ..GovernanceConfig::default()
        },
        |builder| builder,
    );
    let peer: SocketAddr = "192.0.2.44:51000".parse().map_err(|e| format!("{e}"))?;

    let mut statuses = Vec::new();
    for i in 0..20 {
        let mut req = get_from("/api/class/all", &format!("203.0.113.{i}"))?;
        req.extensions_mut().insert(ConnectInfo(peer));
        statuses.push(send(&app.router, req).await?.status());
    }

    let admitted = statuses.iter().filter(|s| **s == StatusCode::OK).count();
    assert_eq!(admitted, 1);
    assert_eq!(app.governance.api_limiter.tracked_clients(), 1);
    assert_eq!(app.governance.api_limiter.count(&"192.0.2.44".into()), 1);
    Ok(())
}

#[tokio::test]
async fn test_disabled_rate_limiting_forwards_everything() -> TestResult {
    let app = build_app(GovernanceConfig {
        rate_limit_enabled: false,
        rate_limit_max_requests: 1,
        ..GovernanceConfig::default()
    });

    for _ in 0..5 {
        let response = send(&app.router, get_from("/api/class/all", "10.0.0.1")?).await?;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(header(&response, "ratelimit-limit").is_none());
    }
    Ok(())
}

#[tokio::test]
async fn test_registration_limit_is_separate_from_api_limit() -> TestResult {
    let app = build_app(GovernanceConfig::default());

    for _ in 0..3 {
        let response = send(&app.router, request("POST", "/api/auth/register")?).await?;
        assert_eq!(response.status(), StatusCode::CREATED);
    }
    let rejected = send(&app.router, request("POST", "/api/auth/register")?).await?;
    assert_eq!(rejected.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(header(&rejected, "retry-after"), Some("3600"));

    let roster = send(&app.router, request("GET", "/api/class/all")?).await?;
    assert_eq!(roster.status(), StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn test_operational_endpoints_are_not_limited() -> TestResult {
    let app = build_app(GovernanceConfig {
        rate_limit_max_requests: 1,
        ..GovernanceConfig::default()
    });

    for _ in 0..3 {
        let response = send(&app.router, get_from("/health", "10.0.0.1")?).await?;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(header(&response, "ratelimit-limit").is_none());
    }

    let metrics = send(&app.router, get_from("/metrics", "10.0.0.1")?).await?;
    assert_eq!(metrics.status(), StatusCode::OK);
    Ok(())
}

// ============================================================================
// LOGIN: FAILURE-ONLY LIMIT AND LOCKOUT
// ============================================================================

#[tokio::test]
async fn test_successful_logins_do_not_consume_auth_budget() -> TestResult {
    let app = build_app(GovernanceConfig::default());

    for _ in 0..10 {
        let response = send(&app.router, login_from("555-1234", "correct-horse", "10.0.0.1")?).await?;
        assert_eq!(response.status(), StatusCode::OK);
    }
    assert_eq!(app.governance.lockout.tracked_identities(), 0);
    Ok(())
}

#[tokio::test]
async fn test_repeated_failures_lock_the_account() -> TestResult {
    let app = build_app(GovernanceConfig::default());

    // Spread attempts over several IPs so the per-IP auth limit stays out
    // of the way.
    for attempt in 0..5 {
        let ip = format!("10.0.1.{}", attempt);
        let response = send(&app.router, login_from("555-1234", "wrong", &ip)?).await?;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    // Even the right password is refused while locked.
    let locked = send(&app.router, login_from("555-1234", "correct-horse", "10.0.2.1")?).await?;
    assert_eq!(locked.status(), StatusCode::LOCKED);
    let body = json_body(locked).await?;
    assert_eq!(body["code"], "ACCOUNT_LOCKED");
    assert_eq!(
        body["message"],
        "Account temporarily locked. Try again in 15 minutes."
    );

    // Another identity is unaffected.
    let other = send(&app.router, login_from("555-9876", "correct-horse", "10.0.2.2")?).await?;
    assert_eq!(other.status(), StatusCode::OK);

    app.clock.advance_secs(10 * 60);
    let still_locked = send(&app.router, login_from("555-1234", "correct-horse", "10.0.2.3")?).await?;
    assert_eq!(json_body(still_locked).await?["details"]["remaining_minutes"], 5);

    app.clock.advance_secs(5 * 60);
    let unlocked = send(&app.router, login_from("555-1234", "correct-horse", "10.0.2.4")?).await?;
    assert_eq!(unlocked.status(), StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn test_failed_logins_exhaust_the_ip_budget() -> TestResult {
    let app = build_app(GovernanceConfig::default());

    for attempt in 0..5 {
        let phone = format!("555-000{}", attempt);
        let response = send(&app.router, login_from(&phone, "wrong", "10.0.3.1")?).await?;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    let rejected = send(&app.router, login_from("555-0009", "correct-horse", "10.0.3.1")?).await?;
    assert_eq!(rejected.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(header(&rejected, "retry-after").is_some());
    Ok(())
}

#[tokio::test]
async fn test_malformed_login_body_reaches_the_handler() -> TestResult {
    let app = build_app(GovernanceConfig::default());

    let request = Request::builder()
        .method("POST")
        .uri("/api/auth/login")
        .header("x-forwarded-for", "10.0.4.1")
        .header("content-type", "application/json")
        .body(Body::from("not json"))
        .map_err(|e| e.to_string())?;
    let response = send(&app.router, request).await?;

    // The JSON extractor rejects it; lockout has nothing to record.
    assert!(response.status().is_client_error());
    assert_ne!(response.status(), StatusCode::LOCKED);
    assert_eq!(app.governance.lockout.tracked_identities(), 0);
    Ok(())
}

// ============================================================================
// RESPONSE CACHE
// ============================================================================

#[tokio::test]
async fn test_second_read_is_served_from_cache() -> TestResult {
    let app = build_app(GovernanceConfig::default());

    let first = send(&app.router, request("GET", "/api/class/all")?).await?;
    assert_eq!(header(&first, "x-cache"), Some("MISS"));
    let first_body = json_body(first).await?;

    let second = send(&app.router, request("GET", "/api/class/all")?).await?;
    assert_eq!(header(&second, "x-cache"), Some("HIT"));
    assert_eq!(json_body(second).await?, first_body);

    assert_eq!(app.roster_calls.load(Ordering::SeqCst), 1);

    app.clock.advance_secs(600);
    let expired = send(&app.router, request("GET", "/api/class/all")?).await?;
    assert_eq!(header(&expired, "x-cache"), Some("MISS"));
    assert_eq!(app.roster_calls.load(Ordering::SeqCst), 2);
    Ok(())
}

#[tokio::test]
async fn test_writes_bypass_the_cache() -> TestResult {
    let app = build_app(GovernanceConfig::default());

    for _ in 0..2 {
        let response = send(&app.router, request("POST", "/api/class/all")?).await?;
        assert_eq!(header(&response, "x-cache"), Some("BYPASS"));
    }
    assert_eq!(app.roster_calls.load(Ordering::SeqCst), 2);
    assert!(app.governance.cache.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_cache_admin_invalidates_entries() -> TestResult {
    let app = build_app_with(
        GovernanceConfig {
            trust_proxy: true,
            ..GovernanceConfig::default()
        },
        |builder| builder.cache_admin_routes(|admin| admin),
    );
    send(&app.router, request("GET", "/api/class/all")?).await?;
    send(&app.router, request("GET", "/api/class/all")?).await?;

    let stats = json_body(send(&app.router, request("GET", "/api/cache/stats")?).await?).await?;
    assert_eq!(stats["stats"]["hits"], 1);
    assert_eq!(stats["stats"]["entry_count"], 1);
    assert_eq!(stats["keys"], json!(["/api/class/all"]));

    let missing = send(&app.router, request("DELETE", "/api/cache/entries")?).await?;
    assert_eq!(missing.status(), StatusCode::BAD_REQUEST);

    let removed = send(
        &app.router,
        request("DELETE", "/api/cache/entries?pattern=%2Fapi%2Fclass")?,
    )
    .await?;
    assert_eq!(removed.status(), StatusCode::OK);
    assert_eq!(json_body(removed).await?["removed"], 1);

    let refetched = send(&app.router, request("GET", "/api/class/all")?).await?;
    assert_eq!(header(&refetched, "x-cache"), Some("MISS"));

    let cleared = send(&app.router, request("DELETE", "/api/cache")?).await?;
    assert_eq!(json_body(cleared).await?["removed"], 1);
    assert!(app.governance.cache.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_cache_admin_is_not_mounted_by_default() -> TestResult {
    let app = build_app(GovernanceConfig::default());
    send(&app.router, request("GET", "/api/class/all")?).await?;

    let stats = send(&app.router, request("GET", "/api/cache/stats")?).await?;
    assert_eq!(stats.status(), StatusCode::NOT_FOUND);
    let cleared = send(&app.router, request("DELETE", "/api/cache")?).await?;
    assert_eq!(cleared.status(), StatusCode::NOT_FOUND);
    assert_eq!(app.governance.cache.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_cache_admin_behind_token() -> TestResult {
    let app = build_app_with(GovernanceConfig::default(), |builder| {
        builder.cache_admin_with_token("s3cret")
    });
    send(&app.router, request("GET", "/api/class/all")?).await?;

    let anonymous = send(&app.router, request("DELETE", "/api/cache")?).await?;
    assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(app.governance.cache.len(), 1);

    let mut authorized = request("DELETE", "/api/cache")?;
    authorized
        .headers_mut()
        .insert("authorization", axum::http::HeaderValue::from_static("Bearer s3cret"));
    let cleared = send(&app.router, authorized).await?;
    assert_eq!(cleared.status(), StatusCode::OK);
    assert!(app.governance.cache.is_empty());
    Ok(())
}

// ============================================================================
// HEALTH
// ============================================================================

#[tokio::test]
async fn test_health_reports_governance_summary() -> TestResult {
    let app = build_app(GovernanceConfig::default());
    send(&app.router, request("GET", "/api/class/all")?).await?;
    send(&app.router, login_from("555-1234", "wrong", "10.0.5.1")?).await?;

    let health = json_body(send(&app.router, request("GET", "/health")?).await?).await?;
    assert_eq!(health["status"], "healthy");
    assert_eq!(health["governance"]["rate_limit_enabled"], true);
    assert_eq!(health["governance"]["cache_entries"], 1);
    assert_eq!(health["governance"]["tracked_clients"], 2);
    assert_eq!(health["governance"]["tracked_identities"], 1);
    assert_eq!(health["governance"]["running_sweepers"], 0);
    Ok(())
}
