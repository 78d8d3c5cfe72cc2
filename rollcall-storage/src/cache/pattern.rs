//! Key patterns for bulk invalidation.

use regex::Regex;
use rollcall_core::{GovernanceError, GovernanceResult};

/// Selects cache keys for [`CacheStore::invalidate_matching`].
///
/// [`CacheStore::invalidate_matching`]: super::CacheStore::invalidate_matching
#[derive(Debug, Clone)]
pub enum KeyPattern {
    /// Key contains the given text anywhere.
    Substring(String),
    /// Key matches the regular expression (unanchored).
    Regex(Regex),
}

impl KeyPattern {
    pub fn substring(text: impl Into<String>) -> Self {
        Self::Substring(text.into())
    }

    /// Compile a regular-expression pattern.
    pub fn regex(pattern: &str) -> GovernanceResult<Self> {
        Regex::new(pattern)
            .map(Self::Regex)
            .map_err(|e| GovernanceError::InvalidPattern {
                pattern: pattern.to_string(),
                reason: e.to_string(),
            })
    }

    pub fn matches(&self, key: &str) -> bool {
        match self {
            KeyPattern::Substring(text) => key.contains(text.as_str()),
            KeyPattern::Regex(re) => re.is_match(key),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            KeyPattern::Substring(text) => text,
            KeyPattern::Regex(re) => re.as_str(),
        }
    }
}

impl std::fmt::Display for KeyPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeyPattern::Substring(text) => write!(f, "{:?}", text),
            KeyPattern::Regex(re) => write!(f, "/{}/", re.as_str()),
        }
    }
}
