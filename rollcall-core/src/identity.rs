//! Identity and time aliases shared across the governance layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Key identifying a client for rate limiting and throttling.
///
/// Usually the client IP address, but limiters accept any stable string
/// (an authenticated user id, an API key fingerprint).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClientKey(String);

impl ClientKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ClientKey {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ClientKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<std::net::IpAddr> for ClientKey {
    fn from(value: std::net::IpAddr) -> Self {
        Self(value.to_string())
    }
}

impl AsRef<str> for ClientKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
