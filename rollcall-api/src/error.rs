//! HTTP error responses for the governance layer
//!
//! Rejections (429, 423), bad admin input (400), a missing admin token (401)
//! and internal faults (500) all render as
//! `{"success": false, "code": .., "message": .., "details": ..}`.
//! A 429 also sets `retry-after`.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use rollcall_core::GovernanceError;
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// ERROR CODE ENUM
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Cache admin request without a valid bearer token
    Unauthorized,

    /// Malformed admin query, e.g. an uncompilable regex
    InvalidInput,
    MissingField,

    /// Identity locked after repeated failed logins
    AccountLocked,
    /// A limiter ceiling was reached
    TooManyRequests,

    InternalError,
}

impl ErrorCode {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorCode::InvalidInput | ErrorCode::MissingField => StatusCode::BAD_REQUEST,
            ErrorCode::AccountLocked => StatusCode::LOCKED,
            ErrorCode::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
            ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message used when the caller supplies none.
    pub fn default_message(&self) -> &'static str {
        match self {
            ErrorCode::Unauthorized => "Authentication required",
            ErrorCode::InvalidInput => "Invalid input",
            ErrorCode::MissingField => "Required field is missing",
            ErrorCode::AccountLocked => "Account temporarily locked",
            ErrorCode::TooManyRequests => "Too many requests, please try again later.",
            ErrorCode::InternalError => "Internal server error",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ============================================================================
// API ERROR STRUCT
// ============================================================================

/// JSON error body. `success` is always `false` so clients written against
/// the plain `{success, message}` shape keep working.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiError {
    #[serde(default)]
    pub success: bool,
    pub code: ErrorCode,
    pub message: String,
    /// Retry hint or remaining lock time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            success: false,
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn status_code(&self) -> StatusCode {
        self.code.status_code()
    }

    /// Seconds the client should wait. Only 429s carry one.
    pub fn retry_after_secs(&self) -> Option<u64> {
        if self.code != ErrorCode::TooManyRequests {
            return None;
        }
        self.details
            .as_ref()
            .and_then(|d| d.get("retry_after_secs"))
            .and_then(serde_json::Value::as_u64)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unauthorized, message)
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, message)
    }

    pub fn missing_field(field: &str) -> Self {
        Self::new(
            ErrorCode::MissingField,
            format!("Required field '{}' is missing", field),
        )
    }

    /// 423 with the whole minutes left on the lock.
    pub fn account_locked(remaining_minutes: u64) -> Self {
        Self::new(
            ErrorCode::AccountLocked,
            format!(
                "Account temporarily locked. Try again in {} minutes.",
                remaining_minutes
            ),
        )
        .with_details(serde_json::json!({ "remaining_minutes": remaining_minutes }))
    }

    /// 429 with the limiter's message and retry hint.
    pub fn too_many_requests(message: impl Into<String>, retry_after_secs: u64) -> Self {
        Self::new(ErrorCode::TooManyRequests, message)
            .with_details(serde_json::json!({ "retry_after_secs": retry_after_secs }))
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

// ============================================================================
// AXUM INTEGRATION
// ============================================================================

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let retry_after = self.retry_after_secs();
        let mut response = (status, Json(self)).into_response();

        if let Some(secs) = retry_after {
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }

        response
    }
}

// ============================================================================
// CONVERSIONS
// ============================================================================

impl From<GovernanceError> for ApiError {
    fn from(err: GovernanceError) -> Self {
        match err {
            GovernanceError::RateExceeded { retry_after_secs } => ApiError::too_many_requests(
                ErrorCode::TooManyRequests.default_message(),
                retry_after_secs,
            ),
            GovernanceError::AccountLocked { remaining_minutes } => {
                ApiError::account_locked(remaining_minutes)
            }
            GovernanceError::InvalidPattern { pattern, reason } => ApiError::invalid_input(
                format!("Invalid pattern '{}': {}", pattern, reason),
            ),
        }
    }
}

// ============================================================================
// RESULT TYPE ALIAS
// ============================================================================

pub type ApiResult<T> = Result<T, ApiError>;
