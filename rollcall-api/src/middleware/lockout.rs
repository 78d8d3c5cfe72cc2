//! Account lockout middleware for credential routes.
//!
//! The identity is read from a JSON body field (`phoneNumber` by default).
//! Requests without one pass through untouched.

use std::sync::Arc;

use axum::{
    body::{Body, Bytes},
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use serde_json::Value;

use crate::constants::{DEFAULT_LOCKOUT_IDENTITY_FIELD, MAX_CREDENTIAL_BODY_BYTES};
use crate::error::{ApiError, ApiResult};
use crate::services::LockoutTracker;

#[derive(Clone)]
pub struct LockoutLayerState {
    pub tracker: Arc<LockoutTracker>,
    /// JSON body field naming the identity.
    pub identity_field: String,
}

impl LockoutLayerState {
    pub fn new(tracker: Arc<LockoutTracker>) -> Self {
        Self {
            tracker,
            identity_field: DEFAULT_LOCKOUT_IDENTITY_FIELD.to_string(),
        }
    }

    pub fn with_identity_field(mut self, field: impl Into<String>) -> Self {
        self.identity_field = field.into();
        self
    }
}

/// Identity named by `field` in a JSON body. Strings and numbers are
/// accepted; anything else counts as absent.
fn extract_identity(body: &Bytes, field: &str) -> Option<String> {
    let value: Value = serde_json::from_slice(body).ok()?;
    match value.get(field)? {
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// How a handler status feeds the lockout state machine.
fn credential_outcome(status: StatusCode) -> Option<bool> {
    if status.is_success() {
        Some(true)
    } else if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        Some(false)
    } else {
        None
    }
}

pub async fn lockout_middleware(
    State(state): State<LockoutLayerState>,
    request: Request,
    next: Next,
) -> ApiResult<Response> {
    let (parts, body) = request.into_parts();
    let bytes = axum::body::to_bytes(body, MAX_CREDENTIAL_BODY_BYTES)
        .await
        .map_err(|e| {
            tracing::warn!(error = %e, "Credential request body could not be read");
            ApiError::invalid_input("Request body could not be read")
        })?;

    let identity = extract_identity(&bytes, &state.identity_field);
    let request = Request::from_parts(parts, Body::from(bytes));

    let Some(identity) = identity else {
        return Ok(next.run(request).await);
    };

    if let Err(e) = state.tracker.guard(&identity) {
        tracing::warn!(identity = %identity, "Rejected attempt on locked account");
        return Err(e.into());
    }

    let response = next.run(request).await;
    if let Some(success) = credential_outcome(response.status()) {
        state.tracker.record(&identity, success);
    }
    Ok(response)
}
