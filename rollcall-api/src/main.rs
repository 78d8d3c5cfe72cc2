//! Rollcall API Server Entry Point
//!
//! Bootstraps logging and governance configuration, starts the background
//! sweepers and serves a small demonstration router behind the governance
//! stack.

use std::net::SocketAddr;

use axum::{
    extract::Path,
    http::StatusCode,
    middleware::from_fn_with_state,
    routing::{get, post},
    Json, Router,
};
use rollcall_api::constants::{DEFAULT_BIND_HOST, DEFAULT_PORT};
use rollcall_api::telemetry::{init_tracing, TelemetryConfig};
use rollcall_api::{
    response_cache_middleware, ApiError, ApiResult, Governance, GovernanceConfig,
    GovernedRouterBuilder, LimiterPreset,
};
use rollcall_core::SystemClock;
use rollcall_storage::CachePolicy;
use serde_json::{json, Value};

#[tokio::main]
async fn main() -> ApiResult<()> {
    init_tracing(&TelemetryConfig::from_env())?;

    let governance = Governance::new(GovernanceConfig::from_env(), SystemClock::shared());
    governance.start_sweepers();

    let app = demo_app(&governance);

    let addr = resolve_bind_addr()?;
    tracing::info!(%addr, "Starting Rollcall API server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to bind {}: {}", addr, e)))?;

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Shutdown signal received");
            }
        })
        .await
        .map_err(|e| ApiError::internal_error(format!("Server error: {}", e)))?;

    governance.shutdown().await;
    Ok(())
}

/// Stand-in school routes showing how a host application plugs in.
fn demo_app(governance: &Governance) -> Router {
    let classes = Router::new()
        .route("/api/class/all", get(list_classes))
        .route_layer(from_fn_with_state(
            governance.cached(CachePolicy::medium()),
            response_cache_middleware,
        ))
        .merge(
            Router::new()
                .route("/api/class/:classId/students", get(class_students))
                .route_layer(from_fn_with_state(
                    governance.cached(CachePolicy::class_specific()),
                    response_cache_middleware,
                )),
        );

    let login = Router::new().route("/api/auth/login", post(login));
    let reset = Router::new().route("/api/auth/reset-password", post(accepted));
    let register = Router::new().route("/api/auth/register", post(accepted));

    let builder = GovernedRouterBuilder::new(governance.clone())
        .domain_routes(classes)
        .login_routes(login)
        .limited_routes(LimiterPreset::PasswordReset, reset)
        .limited_routes(LimiterPreset::Registration, register);

    match governance.config.admin_token.as_deref() {
        Some(token) => builder.cache_admin_with_token(token).build(),
        None => {
            tracing::info!("ROLLCALL_ADMIN_TOKEN unset, cache admin routes not mounted");
            builder.build()
        }
    }
}

async fn list_classes() -> Json<Value> {
    Json(json!({ "success": true, "classes": [] }))
}

async fn class_students(Path(class_id): Path<String>) -> Json<Value> {
    Json(json!({ "success": true, "classId": class_id, "students": [] }))
}

async fn login(Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    let password = body.get("password").and_then(Value::as_str);
    if password == Some("rollcall") {
        (StatusCode::OK, Json(json!({ "success": true })))
    } else {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "success": false, "message": "Invalid credentials" })),
        )
    }
}

async fn accepted() -> (StatusCode, Json<Value>) {
    (StatusCode::ACCEPTED, Json(json!({ "success": true })))
}

fn resolve_bind_addr() -> ApiResult<SocketAddr> {
    let host = std::env::var("ROLLCALL_API_BIND").unwrap_or_else(|_| DEFAULT_BIND_HOST.to_string());
    let port_str = std::env::var("PORT")
        .ok()
        .or_else(|| std::env::var("ROLLCALL_API_PORT").ok())
        .unwrap_or_else(|| DEFAULT_PORT.to_string());
    let port = port_str
        .parse::<u16>()
        .map_err(|_| ApiError::invalid_input(format!("Invalid port value: {}", port_str)))?;

    let addr = format!("{}:{}", host, port);
    addr.parse::<SocketAddr>()
        .map_err(|e| ApiError::invalid_input(format!("Invalid bind address {}: {}", addr, e)))
}
