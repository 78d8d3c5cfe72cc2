//! Request logging and HTTP metrics middleware.

use std::time::{Duration, Instant};

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{info_span, Instrument};

use super::metrics::metrics;
use crate::constants::DEFAULT_SLOW_REQUEST_MS;

static UUID_SEGMENT: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}").ok()
});

static NUMERIC_SEGMENT: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"/\d+(/|$)").ok());

/// Replace UUID and numeric path segments with `{id}` so metric labels stay
/// bounded.
pub fn normalize_path(path: &str) -> String {
    let mut result = path.to_string();
    if let Some(re) = UUID_SEGMENT.as_ref() {
        result = re.replace_all(&result, "{id}").into_owned();
    }
    if let Some(re) = NUMERIC_SEGMENT.as_ref() {
        // Run twice: adjacent numeric segments share a slash, so a single
        // pass only rewrites every other one.
        for _ in 0..2 {
            result = re.replace_all(&result, "/{id}$1").into_owned();
        }
    }
    result
}

/// State for [`request_logger_middleware`].
#[derive(Debug, Clone, Copy)]
pub struct RequestLogConfig {
    /// Requests slower than this are logged at warn.
    pub slow_threshold: Duration,
}

impl Default for RequestLogConfig {
    fn default() -> Self {
        Self {
            slow_threshold: Duration::from_millis(DEFAULT_SLOW_REQUEST_MS),
        }
    }
}

/// Log every request with its status and duration, and record HTTP metrics.
pub async fn request_logger_middleware(
    State(config): State<RequestLogConfig>,
    request: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let uri = request.uri().clone();
    let route = normalize_path(uri.path());

    let span = info_span!(
        "http_request",
        http.method = %method,
        http.target = %uri,
        http.route = %route,
    );

    let response = next.run(request).instrument(span).await;

    let elapsed = start.elapsed();
    let status = response.status().as_u16();
    let duration_ms = elapsed.as_millis() as u64;

    if let Some(m) = metrics() {
        m.record_http_request(method.as_str(), &route, status, elapsed.as_secs_f64());
    }

    if elapsed > config.slow_threshold {
        tracing::warn!(
            method = %method,
            url = %uri,
            status,
            duration_ms,
            threshold_ms = config.slow_threshold.as_millis() as u64,
            "Slow request"
        );
    } else {
        tracing::info!(method = %method, url = %uri, status, duration_ms, "Request completed");
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path_uuid() {
        let path = "/api/student/550e8400-e29b-41d4-a716-446655440000";
        assert_eq!(normalize_path(path), "/api/student/{id}");
    }

    #[test]
    fn test_normalize_path_numeric_id() {
        assert_eq!(normalize_path("/api/class/10"), "/api/class/{id}");
    }

    #[test]
    fn test_normalize_path_adjacent_ids() {
        assert_eq!(
            normalize_path("/api/attendance/2024/11/report"),
            "/api/attendance/{id}/{id}/report"
        );
    }

    #[test]
    fn test_normalize_path_no_ids() {
        assert_eq!(normalize_path("/api/class/all"), "/api/class/all");
        assert_eq!(normalize_path("/health"), "/health");
    }
}
