//! Bounded TTL cache with pattern invalidation.
//!
//! [`CacheStore`] is a generic key/value store with a per-entry TTL, a hard
//! entry ceiling and two expiry paths: passive (an expired entry observed on
//! read is treated as absent and dropped) and active (a periodic
//! [`CacheStore::sweep_expired`] call).
//!
//! [`CacheKeyPolicy`] derives deterministic keys from a [`RequestDescriptor`]
//! and a route's [`CachePolicy`].
//!
//! # Example
//!
//! ```ignore
//! let store = CacheStore::new(CacheStoreConfig::default(), SystemClock::shared());
//! store.set("/api/class/all", json!({"classes": []}));
//!
//! // After a write to any class roster
//! store.invalidate_matching(&KeyPattern::substring("/api/class"));
//! ```

pub mod key;
pub mod pattern;
pub mod store;
pub mod traits;

pub use key::{
    CacheCondition, CacheKeyPolicy, CachePolicy, RequestDescriptor, VaryBy, KEY_SEPARATOR,
};
pub use pattern::KeyPattern;
pub use store::{CacheStore, CacheStoreConfig};
pub use traits::CacheStats;
