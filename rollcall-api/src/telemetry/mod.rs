//! Rollcall Telemetry - Observability Infrastructure
//!
//! Structured logging through `tracing` and Prometheus metrics for the
//! governance layer.

pub mod metrics;
pub mod middleware;
pub mod tracer;

pub use metrics::{metrics, metrics_handler, RollcallMetrics, METRICS};
pub use middleware::{normalize_path, request_logger_middleware, RequestLogConfig};
pub use tracer::{init_tracing, LogFormat, TelemetryConfig};
