//! Response cache middleware.
//!
//! Apply with `route_layer` so path parameters are already matched:
//!
//! ```ignore
//! Router::new()
//!     .route("/api/class/:classId/students", get(list_students))
//!     .route_layer(from_fn_with_state(
//!         CacheLayerState::new(cache, CachePolicy::class_specific()),
//!         response_cache_middleware,
//!     ))
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{FromRequestParts, OriginalUri, RawPathParams, Request, State},
    http::{request::Parts, HeaderName, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use rollcall_storage::{CachePolicy, RequestDescriptor};
use serde_json::Value;

use crate::constants::CACHE_STATUS_HEADER;
use crate::error::ApiError;
use crate::services::{CacheLookup, CacheStatus, CachedResponse, ResponseCache};

/// Authenticated caller, inserted into request extensions by whatever
/// authenticates the request. Cache keys are segmented by `id`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallerIdentity {
    pub id: String,
    /// Extra fields addressable as `user.<name>` in vary-by lists.
    pub attributes: BTreeMap<String, String>,
}

impl CallerIdentity {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }
}

#[derive(Clone)]
pub struct CacheLayerState {
    pub cache: Arc<ResponseCache>,
    pub policy: CachePolicy,
}

impl CacheLayerState {
    pub fn new(cache: Arc<ResponseCache>, policy: CachePolicy) -> Self {
        Self { cache, policy }
    }
}

/// Build the cache view of a request.
///
/// The path is taken from [`OriginalUri`]: inside a nested router
/// `parts.uri` has the prefix stripped.
pub async fn describe_request(parts: &mut Parts) -> RequestDescriptor {
    let uri = parts
        .extensions
        .get::<OriginalUri>()
        .map(|OriginalUri(uri)| uri.clone())
        .unwrap_or_else(|| parts.uri.clone());

    let mut descriptor = RequestDescriptor::new(parts.method.as_str(), uri.path());
    if let Some(query) = uri.query() {
        descriptor = descriptor.with_query(query);
    }

    // Only fails when no route was matched, e.g. outside `route_layer`.
    if let Ok(params) = RawPathParams::from_request_parts(parts, &()).await {
        for (name, value) in &params {
            descriptor = descriptor.with_path_param(name, value);
        }
    }

    if let Some(caller) = parts.extensions.get::<CallerIdentity>() {
        descriptor = descriptor.with_caller(caller.id.clone());
        for (name, value) in &caller.attributes {
            descriptor = descriptor.with_caller_attribute(name.clone(), value.clone());
        }
    }

    descriptor
}

fn mark(mut response: Response, status: CacheStatus) -> Response {
    response.headers_mut().insert(
        HeaderName::from_static(CACHE_STATUS_HEADER),
        HeaderValue::from_static(status.as_str()),
    );
    response
}

fn replay(cached: CachedResponse) -> Response {
    let status = StatusCode::from_u16(cached.status).unwrap_or(StatusCode::OK);
    (status, Json(cached.body)).into_response()
}

pub async fn response_cache_middleware(
    State(state): State<CacheLayerState>,
    request: Request,
    next: Next,
) -> Response {
    let (mut parts, body) = request.into_parts();
    let descriptor = describe_request(&mut parts).await;
    let request = Request::from_parts(parts, body);

    let (key, ttl) = match state.cache.lookup(&descriptor, &state.policy) {
        CacheLookup::Hit(cached) => return mark(replay(cached), CacheStatus::Hit),
        CacheLookup::Bypass => return mark(next.run(request).await, CacheStatus::Bypass),
        CacheLookup::Miss { key, ttl } => (key, ttl),
    };

    let response = next.run(request).await;
    if response.status() != StatusCode::OK {
        return mark(response, CacheStatus::Miss);
    }

    let (parts, body) = response.into_parts();
    let bytes = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::error!(key = %key, error = %e, "Failed to buffer response body");
            return ApiError::internal_error("Failed to read response").into_response();
        }
    };

    match serde_json::from_slice::<Value>(&bytes) {
        Ok(json) => {
            state
                .cache
                .store(&key, ttl, &CachedResponse::new(parts.status.as_u16(), json));
        }
        Err(_) => tracing::debug!(key = %key, "Response is not JSON, not caching"),
    }

    mark(Response::from_parts(parts, Body::from(bytes)), CacheStatus::Miss)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{extract::Path, middleware, routing::get, Router};
    use rollcall_core::ManualClock;
    use rollcall_storage::CacheStoreConfig;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tower::ServiceExt;

    fn app(policy: CachePolicy, calls: Arc<AtomicUsize>) -> (Arc<ResponseCache>, Router) {
        let cache = Arc::new(ResponseCache::new(
            CacheStoreConfig::default(),
            Arc::new(ManualClock::at_epoch()),
        ));
        let handler = move |Path(class_id): Path<String>| {
            let calls = Arc::clone(&calls);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Json(json!({"success": true, "classId": class_id}))
            }
        };
        let router = Router::new()
            .route("/api/class/:classId/students", get(handler.clone()).post(handler))
            .route_layer(middleware::from_fn_with_state(
                CacheLayerState::new(Arc::clone(&cache), policy),
                response_cache_middleware,
            ));
        (cache, router)
    }

    fn request(method: &str, uri: &str) -> Result<Request, String> {
        axum::http::Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .map_err(|e| e.to_string())
    }

    #[tokio::test]
    async fn test_second_get_is_a_hit() -> Result<(), String> {
        let calls = Arc::new(AtomicUsize::new(0));
        let (cache, app) = app(CachePolicy::class_specific(), Arc::clone(&calls));

        let first = app
            .clone()
            .oneshot(request("GET", "/api/class/10/students")?)
            .await
            .map_err(|e| e.to_string())?;
        assert_eq!(first.headers()["x-cache"], "MISS");

        let second = app
            .oneshot(request("GET", "/api/class/10/students")?)
            .await
            .map_err(|e| e.to_string())?;
        assert_eq!(second.headers()["x-cache"], "HIT");
        let body = axum::body::to_bytes(second.into_body(), usize::MAX)
            .await
            .map_err(|e| e.to_string())?;
        let body: Value = serde_json::from_slice(&body).map_err(|e| e.to_string())?;
        assert_eq!(body["classId"], "10");

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            cache.keys(),
            vec!["/api/class/10/students|params.classId:10".to_string()]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_post_is_bypassed() -> Result<(), String> {
        let calls = Arc::new(AtomicUsize::new(0));
        let (cache, app) = app(CachePolicy::medium(), Arc::clone(&calls));

        for _ in 0..2 {
            let response = app
                .clone()
                .oneshot(request("POST", "/api/class/10/students")?)
                .await
                .map_err(|e| e.to_string())?;
            assert_eq!(response.headers()["x-cache"], "BYPASS");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(cache.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_caller_segments_key() -> Result<(), String> {
        let calls = Arc::new(AtomicUsize::new(0));
        let (cache, app) = app(CachePolicy::user_specific(), Arc::clone(&calls));

        for caller in ["7", "8"] {
            let mut req = request("GET", "/api/class/10/students")?;
            req.extensions_mut().insert(CallerIdentity::new(caller));
            app.clone().oneshot(req).await.map_err(|e| e.to_string())?;
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_nested_routers_keep_their_prefix() -> Result<(), String> {
        let cache = Arc::new(ResponseCache::new(
            CacheStoreConfig::default(),
            Arc::new(ManualClock::at_epoch()),
        ));
        let listing = |who: &'static str| {
            Router::new()
                .route("/all", get(move || async move { Json(json!({ "who": who })) }))
                .route_layer(middleware::from_fn_with_state(
                    CacheLayerState::new(Arc::clone(&cache), CachePolicy::medium()),
                    response_cache_middleware,
                ))
        };
        let app = Router::new()
            .nest("/api/class", listing("class"))
            .nest("/api/staff", listing("staff"));

        let class = app
            .clone()
            .oneshot(request("GET", "/api/class/all?page=2")?)
            .await
            .map_err(|e| e.to_string())?;
        assert_eq!(class.headers()["x-cache"], "MISS");

        let staff = app
            .oneshot(request("GET", "/api/staff/all?page=2")?)
            .await
            .map_err(|e| e.to_string())?;
        assert_eq!(staff.headers()["x-cache"], "MISS");
        let body = axum::body::to_bytes(staff.into_body(), usize::MAX)
            .await
            .map_err(|e| e.to_string())?;
        let body: Value = serde_json::from_slice(&body).map_err(|e| e.to_string())?;
        assert_eq!(body["who"], "staff");

        let mut keys = cache.keys();
        keys.sort();
        assert_eq!(
            keys,
            vec!["/api/class/all?page=2".to_string(), "/api/staff/all?page=2".to_string()]
        );
        Ok(())
    }
}
