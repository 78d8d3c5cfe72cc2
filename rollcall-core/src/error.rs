//! Error types for governance operations

use thiserror::Error;

/// Outcomes of the governance layer that are surfaced as errors.
///
/// Only `RateExceeded` and `AccountLocked` block a request. `InvalidPattern`
/// is a bad cache-invalidation pattern from an admin caller.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GovernanceError {
    #[error("Rate limit exceeded, retry after {retry_after_secs}s")]
    RateExceeded { retry_after_secs: u64 },

    #[error("Account temporarily locked, {remaining_minutes} minute(s) remaining")]
    AccountLocked { remaining_minutes: u64 },

    #[error("Invalid key pattern {pattern:?}: {reason}")]
    InvalidPattern { pattern: String, reason: String },
}

impl GovernanceError {
    /// Whether this error is an intended, user-facing rejection.
    pub fn is_blocking(&self) -> bool {
        matches!(
            self,
            GovernanceError::RateExceeded { .. } | GovernanceError::AccountLocked { .. }
        )
    }
}

/// Result type for governance operations.
pub type GovernanceResult<T> = Result<T, GovernanceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blocking_classification() {
        assert!(GovernanceError::RateExceeded { retry_after_secs: 3 }.is_blocking());
        assert!(GovernanceError::AccountLocked { remaining_minutes: 15 }.is_blocking());
        assert!(!GovernanceError::InvalidPattern {
            pattern: "(".to_string(),
            reason: "unclosed group".to_string(),
        }
        .is_blocking());
    }

    #[test]
    fn test_error_display() {
        let err = GovernanceError::AccountLocked { remaining_minutes: 7 };
        assert!(err.to_string().contains("7 minute"));

        let err = GovernanceError::RateExceeded { retry_after_secs: 42 };
        assert!(err.to_string().contains("42s"));
    }
}
