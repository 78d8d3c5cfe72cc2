//! Deterministic cache-key derivation.
//!
//! A key is built from up to three kinds of parts, joined by
//! [`KEY_SEPARATOR`]:
//!
//! 1. the route identity (path plus `?query` exactly as issued)
//! 2. `user:<id>` when the request carries a resolved caller
//! 3. `<label>:<value>` for each declared vary-by field that resolves
//!
//! `%` and `|` inside any part are percent-escaped, so a part can never
//! contain the separator and two different requests cannot compose the same
//! key by accident.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Separator between key parts.
pub const KEY_SEPARATOR: char = '|';

// ============================================================================
// REQUEST DESCRIPTOR
// ============================================================================

/// The parts of an inbound request the governance layer looks at.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestDescriptor {
    /// HTTP method, e.g. `GET`.
    pub method: String,
    /// Canonical route path, e.g. `/api/class/10/A/students`.
    pub path: String,
    /// Raw query string without the leading `?`.
    pub query: Option<String>,
    /// Resolved caller identity, absent for anonymous requests.
    pub caller_id: Option<String>,
    /// Matched path parameters, e.g. `classId -> 10`.
    pub path_params: BTreeMap<String, String>,
    /// Decoded query parameters.
    pub query_params: BTreeMap<String, String>,
    /// Additional caller attributes (role, school, ...).
    pub caller_attributes: BTreeMap<String, String>,
}

impl RequestDescriptor {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new("GET", path)
    }

    /// Attach a raw query string and parse its parameters.
    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        let query = query.into();
        let query = query.strip_prefix('?').unwrap_or(&query).to_string();
        self.query_params = parse_query(&query);
        self.query = (!query.is_empty()).then_some(query);
        self
    }

    pub fn with_caller(mut self, caller_id: impl Into<String>) -> Self {
        self.caller_id = Some(caller_id.into());
        self
    }

    pub fn with_path_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.path_params.insert(name.into(), value.into());
        self
    }

    pub fn with_caller_attribute(
        mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.caller_attributes.insert(name.into(), value.into());
        self
    }

    /// Whether the method is safe to serve from cache (GET or HEAD).
    pub fn is_read_only(&self) -> bool {
        self.method.eq_ignore_ascii_case("GET") || self.method.eq_ignore_ascii_case("HEAD")
    }

    /// Path plus query string as issued.
    pub fn route_identity(&self) -> String {
        match &self.query {
            Some(query) => format!("{}?{}", self.path, query),
            None => self.path.clone(),
        }
    }
}

fn parse_query(query: &str) -> BTreeMap<String, String> {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((name, value)) => (name.to_string(), value.to_string()),
            None => (pair.to_string(), String::new()),
        })
        .collect()
}

// ============================================================================
// VARY-BY FIELDS
// ============================================================================

/// A request attribute that participates in the cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum VaryBy {
    /// Matched path parameter (`params.<name>`).
    PathParam(String),
    /// Query parameter (`query.<name>`).
    QueryParam(String),
    /// Caller attribute (`user.<name>`); `user.id` is the caller identity.
    Caller(String),
}

impl VaryBy {
    pub fn path_param(name: impl Into<String>) -> Self {
        Self::PathParam(name.into())
    }

    pub fn query_param(name: impl Into<String>) -> Self {
        Self::QueryParam(name.into())
    }

    pub fn caller(name: impl Into<String>) -> Self {
        Self::Caller(name.into())
    }

    /// Parse the dotted form used in route declarations, e.g. `query.page`.
    pub fn parse(field: &str) -> Option<Self> {
        let (scope, name) = field.split_once('.')?;
        if name.is_empty() {
            return None;
        }
        match scope {
            "params" => Some(Self::path_param(name)),
            "query" => Some(Self::query_param(name)),
            "user" => Some(Self::caller(name)),
            _ => None,
        }
    }

    /// Label written into the key, e.g. `params.classId`.
    pub fn label(&self) -> String {
        match self {
            VaryBy::PathParam(name) => format!("params.{}", name),
            VaryBy::QueryParam(name) => format!("query.{}", name),
            VaryBy::Caller(name) => format!("user.{}", name),
        }
    }

    /// Resolve the field against a request. Unresolvable fields yield `None`.
    pub fn resolve<'a>(&self, request: &'a RequestDescriptor) -> Option<&'a str> {
        match self {
            VaryBy::PathParam(name) => request.path_params.get(name).map(String::as_str),
            VaryBy::QueryParam(name) => request.query_params.get(name).map(String::as_str),
            VaryBy::Caller(name) => request
                .caller_attributes
                .get(name)
                .map(String::as_str)
                .or_else(|| (name == "id").then_some(request.caller_id.as_deref()).flatten()),
        }
    }
}

impl fmt::Display for VaryBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

// ============================================================================
// PER-ROUTE POLICY
// ============================================================================

/// Predicate deciding whether a request may use the cache at all.
pub type CacheCondition = Arc<dyn Fn(&RequestDescriptor) -> bool + Send + Sync>;

/// Caching rules declared by a route.
#[derive(Clone, Default)]
pub struct CachePolicy {
    /// TTL for stored responses; the store default applies when `None`.
    pub ttl: Option<Duration>,
    /// Fields that segment the cache.
    pub vary_by: Vec<VaryBy>,
    /// Fixed key used verbatim instead of deriving one.
    pub key: Option<String>,
    /// Requests failing this predicate bypass the cache.
    pub condition: Option<CacheCondition>,
}

impl fmt::Debug for CachePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachePolicy")
            .field("ttl", &self.ttl)
            .field("vary_by", &self.vary_by)
            .field("key", &self.key)
            .field("condition", &self.condition.is_some())
            .finish()
    }
}

impl CachePolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn vary_by(mut self, field: VaryBy) -> Self {
        self.vary_by.push(field);
        self
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_condition<F>(mut self, condition: F) -> Self
    where
        F: Fn(&RequestDescriptor) -> bool + Send + Sync + 'static,
    {
        self.condition = Some(Arc::new(condition));
        self
    }

    /// Whether the request is eligible for caching under this policy.
    pub fn applies_to(&self, request: &RequestDescriptor) -> bool {
        request.is_read_only()
            && self
                .condition
                .as_ref()
                .map_or(true, |condition| condition(request))
    }

    /// Frequently changing data (1 minute).
    pub fn short() -> Self {
        Self::new().with_ttl(Duration::from_secs(60))
    }

    /// Moderately changing data (10 minutes).
    pub fn medium() -> Self {
        Self::new().with_ttl(Duration::from_secs(600))
    }

    /// Rarely changing data (1 hour).
    pub fn long() -> Self {
        Self::new().with_ttl(Duration::from_secs(3600))
    }

    pub fn user_specific() -> Self {
        Self::medium().vary_by(VaryBy::caller("id"))
    }

    /// Per-class rosters (30 minutes).
    pub fn class_specific() -> Self {
        Self::new()
            .with_ttl(Duration::from_secs(1800))
            .vary_by(VaryBy::path_param("classId"))
    }

    /// Paginated listings (5 minutes).
    pub fn paginated() -> Self {
        Self::new()
            .with_ttl(Duration::from_secs(300))
            .vary_by(VaryBy::query_param("page"))
            .vary_by(VaryBy::query_param("limit"))
    }
}

// ============================================================================
// KEY POLICY
// ============================================================================

/// Derives cache keys from requests.
#[derive(Debug, Clone)]
pub struct CacheKeyPolicy {
    /// Segment keys by caller identity. Disable only for data that is
    /// identical for every caller.
    pub include_caller: bool,
}

impl Default for CacheKeyPolicy {
    fn default() -> Self {
        Self {
            include_caller: true,
        }
    }
}

impl CacheKeyPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn derive(&self, request: &RequestDescriptor, policy: &CachePolicy) -> String {
        if let Some(key) = &policy.key {
            return key.clone();
        }

        let mut parts = vec![escape_part(&request.route_identity())];

        if self.include_caller {
            if let Some(caller) = &request.caller_id {
                parts.push(format!("user:{}", escape_part(caller)));
            }
        }

        for field in &policy.vary_by {
            if let Some(value) = field.resolve(request) {
                parts.push(format!("{}:{}", escape_part(&field.label()), escape_part(value)));
            }
        }

        parts.join(&KEY_SEPARATOR.to_string())
    }

    /// Escaped form of a path, suitable for prefix invalidation.
    pub fn route_prefix(path: &str) -> String {
        escape_part(path)
    }
}

fn escape_part(part: &str) -> String {
    if !part.contains(['%', KEY_SEPARATOR]) {
        return part.to_string();
    }
    part.replace('%', "%25").replace(KEY_SEPARATOR, "%7C")
}
