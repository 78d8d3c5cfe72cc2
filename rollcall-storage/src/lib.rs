//! Rollcall Storage - In-Process Cache
//!
//! Holds the bounded TTL store used for response caching and the policy that
//! turns a request into a cache key. Nothing here is persisted; the store
//! lives for the lifetime of the process.

pub mod cache;

pub use cache::{
    CacheCondition, CacheKeyPolicy, CachePolicy, CacheStats, CacheStore, CacheStoreConfig,
    KeyPattern, RequestDescriptor, VaryBy,
};
