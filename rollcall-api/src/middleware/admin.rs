//! Bearer-token guard for the cache administration routes.
//!
//! ```ignore
//! let admin = cache_admin_router(governance.clone())
//!     .route_layer(middleware::from_fn_with_state(AdminGuard::new(token), admin_guard_middleware));
//! ```

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};

use crate::error::ApiError;

#[derive(Clone)]
pub struct AdminGuard {
    token: Arc<str>,
}

impl AdminGuard {
    pub fn new(token: impl Into<Arc<str>>) -> Self {
        Self {
            token: token.into(),
        }
    }

    fn accepts(&self, presented: &str) -> bool {
        let expected = self.token.as_bytes();
        let presented = presented.as_bytes();
        // Compare every byte so timing does not reveal the matching prefix.
        expected.len() == presented.len()
            && expected
                .iter()
                .zip(presented)
                .fold(0u8, |acc, (a, b)| acc | (a ^ b))
                == 0
    }
}

pub async fn admin_guard_middleware(
    State(guard): State<AdminGuard>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(|| ApiError::unauthorized("Admin token required"))?;

    if !guard.accepts(token.trim()) {
        tracing::warn!(path = %request.uri().path(), "Rejected cache admin request");
        return Err(ApiError::unauthorized("Invalid admin token"));
    }

    Ok(next.run(request).await)
}
