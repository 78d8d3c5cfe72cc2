//! Prometheus Metrics Definitions
//!
//! Governance metrics registered with the default Prometheus registry and
//! exposed on `GET /metrics`.

use axum::{http::StatusCode, response::IntoResponse};
use once_cell::sync::Lazy;
use prometheus::{
    register_counter, register_counter_vec, register_histogram, register_histogram_vec, Counter,
    CounterVec, Encoder, Histogram, HistogramVec, TextEncoder,
};

use crate::error::{ApiError, ApiResult};

/// HTTP request latency buckets (seconds)
/// Covers: 1ms, 5ms, 10ms, 25ms, 50ms, 100ms, 250ms, 500ms, 1s, 2.5s, 5s, 10s
const HTTP_LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0, 2.5, 5.0, 10.0,
];

/// Throttle delays are multiples of the step, capped at a few seconds.
const THROTTLE_DELAY_BUCKETS: &[f64] = &[0.5, 1.0, 1.5, 2.0, 2.5, 3.0, 4.0, 5.0, 10.0];

/// Global metrics instance, registered on first use.
pub static METRICS: Lazy<ApiResult<RollcallMetrics>> = Lazy::new(RollcallMetrics::new);

/// Registered metrics, or `None` when registration failed. Recording is
/// best-effort and never blocks a request.
pub fn metrics() -> Option<&'static RollcallMetrics> {
    METRICS.as_ref().ok()
}

#[derive(Clone)]
pub struct RollcallMetrics {
    /// labels: method, path, status
    pub http_requests_total: CounterVec,

    /// labels: method, path
    pub http_request_duration_seconds: HistogramVec,

    /// labels: result (hit, miss, bypass)
    pub cache_lookups_total: CounterVec,

    /// labels: limiter
    pub rate_limited_total: CounterVec,

    pub throttle_delay_seconds: Histogram,

    pub lockouts_total: Counter,

    /// labels: component
    pub sweep_removed_total: CounterVec,
}

fn registration_error(name: &str, e: prometheus::Error) -> ApiError {
    ApiError::internal_error(format!("Failed to register {}: {}", name, e))
}

impl RollcallMetrics {
    /// Create and register all metrics with Prometheus.
    pub fn new() -> ApiResult<Self> {
        Ok(Self {
            http_requests_total: register_counter_vec!(
                "rollcall_http_requests_total",
                "Total number of HTTP requests",
                &["method", "path", "status"]
            )
            .map_err(|e| registration_error("http_requests_total", e))?,

            http_request_duration_seconds: register_histogram_vec!(
                "rollcall_http_request_duration_seconds",
                "HTTP request duration in seconds",
                &["method", "path"],
                HTTP_LATENCY_BUCKETS.to_vec()
            )
            .map_err(|e| registration_error("http_request_duration_seconds", e))?,

            cache_lookups_total: register_counter_vec!(
                "rollcall_cache_lookups_total",
                "Response cache lookups by result",
                &["result"]
            )
            .map_err(|e| registration_error("cache_lookups_total", e))?,

            rate_limited_total: register_counter_vec!(
                "rollcall_rate_limited_total",
                "Requests rejected by a rate limiter",
                &["limiter"]
            )
            .map_err(|e| registration_error("rate_limited_total", e))?,

            throttle_delay_seconds: register_histogram!(
                "rollcall_throttle_delay_seconds",
                "Delay imposed on throttled requests",
                THROTTLE_DELAY_BUCKETS.to_vec()
            )
            .map_err(|e| registration_error("throttle_delay_seconds", e))?,

            lockouts_total: register_counter!(
                "rollcall_lockouts_total",
                "Identities locked after repeated credential failures"
            )
            .map_err(|e| registration_error("lockouts_total", e))?,

            sweep_removed_total: register_counter_vec!(
                "rollcall_sweep_removed_total",
                "Expired entries removed by background sweepers",
                &["component"]
            )
            .map_err(|e| registration_error("sweep_removed_total", e))?,
        })
    }

    pub fn record_http_request(&self, method: &str, path: &str, status: u16, duration_secs: f64) {
        let status_str = status.to_string();
        self.http_requests_total
            .with_label_values(&[method, path, &status_str])
            .inc();
        self.http_request_duration_seconds
            .with_label_values(&[method, path])
            .observe(duration_secs);
    }

    pub fn record_cache_lookup(&self, result: &str) {
        self.cache_lookups_total.with_label_values(&[result]).inc();
    }

    pub fn record_rate_limited(&self, limiter: &str) {
        self.rate_limited_total.with_label_values(&[limiter]).inc();
    }

    pub fn record_throttle_delay(&self, delay_secs: f64) {
        self.throttle_delay_seconds.observe(delay_secs);
    }

    pub fn record_lockout(&self) {
        self.lockouts_total.inc();
    }

    pub fn record_sweep_removed(&self, component: &str, removed: usize) {
        self.sweep_removed_total
            .with_label_values(&[component])
            .inc_by(removed as f64);
    }
}

/// Handler for GET /metrics.
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    match encoder.encode(&metric_families, &mut buffer) {
        Ok(_) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("content-type", "text/plain")],
                format!("Failed to encode metrics: {}", e).into_bytes(),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prometheus::core::Collector;

    fn registered() -> Result<&'static RollcallMetrics, String> {
        METRICS
            .as_ref()
            .map_err(|e| format!("Metrics init failed: {}", e.message))
    }

    #[test]
    fn test_metrics_creation() -> Result<(), String> {
        let metrics = registered()?;
        assert!(!metrics.http_requests_total.desc().is_empty());
        assert!(super::metrics().is_some());
        Ok(())
    }

    #[test]
    fn test_governance_counters() -> Result<(), String> {
        let metrics = registered()?;

        let before = metrics.rate_limited_total.with_label_values(&["registration"]).get();
        metrics.record_rate_limited("registration");
        let after = metrics.rate_limited_total.with_label_values(&["registration"]).get();
        assert!(after >= before + 1.0);

        metrics.record_sweep_removed("cache", 3);
        metrics.record_cache_lookup("hit");
        metrics.record_throttle_delay(0.5);
        metrics.record_lockout();
        metrics.record_http_request("GET", "/api/class/{id}", 200, 0.015);
        Ok(())
    }
}
