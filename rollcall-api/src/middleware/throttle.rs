//! Speed throttle middleware: holds requests past the free threshold.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use super::rate_limit::extract_client_ip;
use crate::services::SpeedThrottle;
use crate::telemetry::metrics;

#[derive(Clone)]
pub struct ThrottleState {
    pub throttle: Arc<SpeedThrottle>,
    pub enabled: bool,
    pub trust_proxy: bool,
}

impl ThrottleState {
    pub fn new(throttle: Arc<SpeedThrottle>) -> Self {
        Self {
            throttle,
            enabled: true,
            trust_proxy: false,
        }
    }

    pub fn with_trust_proxy(mut self, trust_proxy: bool) -> Self {
        self.trust_proxy = trust_proxy;
        self
    }
}

pub async fn throttle_middleware(
    State(state): State<ThrottleState>,
    request: Request,
    next: Next,
) -> Response {
    if state.enabled {
        let key = extract_client_ip(&request, state.trust_proxy);
        let delay = state.throttle.delay_for(&key);
        if !delay.is_zero() {
            if let Some(m) = metrics() {
                m.record_throttle_delay(delay.as_secs_f64());
            }
            tokio::time::sleep(delay).await;
        }
    }
    next.run(request).await
}
