//! Rollcall Test Utilities
//!
//! Shared test infrastructure for the Rollcall workspace:
//! - Proptest generators for request paths, client keys and identities
//! - Fixtures for clocks and request descriptors
//! - Assertions over governance results

// Re-export core types for convenience
pub use rollcall_core::{
    ClientKey, Clock, GovernanceError, GovernanceResult, ManualClock, SharedClock, Timestamp,
};
pub use rollcall_storage::{CachePolicy, RequestDescriptor, VaryBy};

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for governance inputs.

    use super::*;
    use proptest::prelude::*;

    /// A single URL path segment, including characters that need escaping
    /// in cache keys.
    pub fn arb_segment() -> impl Strategy<Value = String> {
        "[a-zA-Z0-9_%|-]{1,12}"
    }

    /// An `/api/...` path of one to five segments.
    pub fn arb_path() -> impl Strategy<Value = String> {
        prop::collection::vec(arb_segment(), 1..5)
            .prop_map(|segments| format!("/api/{}", segments.join("/")))
    }

    /// A query string such as `page=2&limit=10`, possibly empty.
    pub fn arb_query() -> impl Strategy<Value = String> {
        prop::collection::btree_map("[a-z]{1,6}", "[a-zA-Z0-9|%]{0,6}", 0..4).prop_map(|params| {
            params
                .into_iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect::<Vec<_>>()
                .join("&")
        })
    }

    /// An IPv4 client key.
    pub fn arb_client_key() -> impl Strategy<Value = ClientKey> {
        any::<[u8; 4]>()
            .prop_map(|[a, b, c, d]| ClientKey::new(format!("{}.{}.{}.{}", a, b, c, d)))
    }

    /// A phone number used as a login identity.
    pub fn arb_phone_number() -> impl Strategy<Value = String> {
        "[0-9]{3}-[0-9]{4}"
    }

    /// A cache TTL in seconds, up to one day.
    pub fn arb_ttl_secs() -> impl Strategy<Value = u64> {
        1u64..86_400
    }

    /// A GET request descriptor with optional query and caller.
    pub fn arb_request() -> impl Strategy<Value = RequestDescriptor> {
        (
            arb_path(),
            prop::option::of(arb_query()),
            prop::option::of("[a-z0-9|]{1,8}"),
        )
            .prop_map(|(path, query, caller)| {
                let mut request = RequestDescriptor::get(path);
                if let Some(query) = query {
                    request = request.with_query(query);
                }
                if let Some(caller) = caller {
                    request = request.with_caller(caller);
                }
                request
            })
    }

    /// A sequence of login outcomes, `true` for success.
    pub fn arb_login_outcomes(max_len: usize) -> impl Strategy<Value = Vec<bool>> {
        prop::collection::vec(any::<bool>(), 0..max_len)
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built fixtures for common scenarios.

    use super::*;
    use chrono::{TimeZone, Utc};
    use std::sync::Arc;

    /// Monday 2024-01-01 08:00 UTC, the start of a school day.
    pub fn school_morning() -> Timestamp {
        Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0)
            .single()
            .unwrap_or_default()
    }

    /// A manual clock frozen at [`school_morning`].
    pub fn manual_clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(school_morning()))
    }

    /// `GET /api/class/all`, the roster listing.
    pub fn class_list_request() -> RequestDescriptor {
        RequestDescriptor::get("/api/class/all")
    }

    /// `GET /api/class/<id>/students` with the matched path parameter.
    pub fn class_students_request(class_id: &str) -> RequestDescriptor {
        RequestDescriptor::get(format!("/api/class/{}/students", class_id))
            .with_path_param("classId", class_id)
    }

    /// Paginated student listing for a signed-in caller.
    pub fn paginated_students_request(caller: &str, page: u32, limit: u32) -> RequestDescriptor {
        RequestDescriptor::get("/api/class/students/all")
            .with_query(format!("page={}&limit={}", page, limit))
            .with_caller(caller)
    }

    /// JSON login body keyed by phone number.
    pub fn login_body(phone_number: &str, password: &str) -> String {
        serde_json::json!({ "phoneNumber": phone_number, "password": password }).to_string()
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions over governance results.

    use super::*;

    /// Assert that a result is a rate rejection with the given retry hint.
    #[track_caller]
    pub fn assert_rate_exceeded<T: std::fmt::Debug>(result: &GovernanceResult<T>, retry_after: u64) {
        match result {
            Err(GovernanceError::RateExceeded { retry_after_secs }) => {
                assert_eq!(*retry_after_secs, retry_after, "Wrong retry-after");
            }
            other => panic!("Expected RateExceeded, got: {:?}", other),
        }
    }

    /// Assert that a result is a lockout with the given remaining minutes.
    #[track_caller]
    pub fn assert_account_locked<T: std::fmt::Debug>(
        result: &GovernanceResult<T>,
        remaining: u64,
    ) {
        match result {
            Err(GovernanceError::AccountLocked { remaining_minutes }) => {
                assert_eq!(*remaining_minutes, remaining, "Wrong remaining minutes");
            }
            other => panic!("Expected AccountLocked, got: {:?}", other),
        }
    }

    /// Assert that a cache key never contains an unescaped separator inside
    /// a part, i.e. splitting yields `expected_parts` parts.
    #[track_caller]
    pub fn assert_key_parts(key: &str, expected_parts: usize) {
        let parts = key.split('|').count();
        assert_eq!(parts, expected_parts, "Unexpected part count in key {:?}", key);
    }
}
