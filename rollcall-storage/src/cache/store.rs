//! TTL key/value store with a hard entry ceiling.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::Duration;

use rollcall_core::clock::add_duration;
use rollcall_core::{SharedClock, Timestamp};

use super::pattern::KeyPattern;
use super::traits::CacheStats;

/// Default time-to-live for cached entries (10 minutes).
pub const DEFAULT_TTL: Duration = Duration::from_secs(600);

/// Default interval between active expiry sweeps (2 minutes).
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(120);

/// Default maximum number of entries.
pub const DEFAULT_MAX_ENTRIES: usize = 1000;

/// Configuration for [`CacheStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStoreConfig {
    /// TTL applied when the caller does not supply one.
    pub default_ttl: Duration,
    /// Hard ceiling on stored entries. Zero disables storage entirely.
    pub max_entries: usize,
    /// How often the background sweep removes expired entries.
    pub sweep_interval: Duration,
}

impl Default for CacheStoreConfig {
    fn default() -> Self {
        Self {
            default_ttl: DEFAULT_TTL,
            max_entries: DEFAULT_MAX_ENTRIES,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }
}

impl CacheStoreConfig {
    /// Create a new store config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the default TTL.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    /// Set the maximum entry count.
    pub fn with_max_entries(mut self, max: usize) -> Self {
        self.max_entries = max;
        self
    }

    /// Set the sweep interval.
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }
}

struct Entry<V> {
    value: V,
    inserted_at: Timestamp,
    expires_at: Timestamp,
    /// Insertion sequence; key into `Index::order`.
    seq: u64,
}

impl<V> Entry<V> {
    fn is_live(&self, now: Timestamp) -> bool {
        self.expires_at > now
    }
}

struct Index<V> {
    entries: HashMap<String, Entry<V>>,
    /// Insertion order, oldest first. Always holds exactly one seq per entry.
    order: BTreeMap<u64, String>,
    next_seq: u64,
}

impl<V> Default for Index<V> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            order: BTreeMap::new(),
            next_seq: 0,
        }
    }
}

impl<V> Index<V> {
    fn remove(&mut self, key: &str) -> Option<Entry<V>> {
        let entry = self.entries.remove(key)?;
        self.order.remove(&entry.seq);
        Some(entry)
    }
}

/// Bounded, thread-safe TTL store.
///
/// Values are cloned out on every read, so callers can never mutate cached
/// state in place. When the store is full, inserting a new key evicts the
/// entry with the oldest insertion time; overwriting a key re-stamps it as
/// the newest.
///
/// A poisoned lock never surfaces to callers: reads degrade to misses and
/// writes are dropped with a warning.
pub struct CacheStore<V> {
    config: CacheStoreConfig,
    clock: SharedClock,
    index: RwLock<Index<V>>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
}

impl<V: Clone + Send + Sync> CacheStore<V> {
    pub fn new(config: CacheStoreConfig, clock: SharedClock) -> Self {
        Self {
            config,
            clock,
            index: RwLock::new(Index::default()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            expirations: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &CacheStoreConfig {
        &self.config
    }

    /// Look up a live entry.
    ///
    /// An entry at or past its expiry is reported as a miss and dropped.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = self.clock.now();

        let expired = match self.index.read() {
            Ok(index) => match index.entries.get(key) {
                Some(entry) if entry.is_live(now) => {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    return Some(entry.value.clone());
                }
                Some(_) => true,
                None => false,
            },
            Err(_) => {
                tracing::warn!(key, "Cache index lock poisoned, treating read as miss");
                false
            }
        };

        if expired {
            self.remove_if_expired(key, now);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Store a value with the configured default TTL.
    pub fn set(&self, key: impl Into<String>, value: V) {
        self.set_with_ttl(key, value, self.config.default_ttl);
    }

    /// Store a value, replacing any existing entry for the key.
    pub fn set_with_ttl(&self, key: impl Into<String>, value: V, ttl: Duration) {
        if self.config.max_entries == 0 {
            return;
        }

        let key = key.into();
        let now = self.clock.now();
        let expires_at = add_duration(now, ttl);

        let mut guard = match self.index.write() {
            Ok(guard) => guard,
            Err(_) => {
                tracing::warn!(key = %key, "Cache index lock poisoned, dropping write");
                return;
            }
        };
        let index = &mut *guard;

        if index.remove(&key).is_none() {
            while index.entries.len() >= self.config.max_entries {
                let Some((_, oldest)) = index.order.pop_first() else {
                    break;
                };
                index.entries.remove(&oldest);
                self.evictions.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(evicted = %oldest, "Cache at capacity, evicted oldest entry");
            }
        }

        let seq = index.next_seq;
        index.next_seq += 1;
        index.order.insert(seq, key.clone());
        index.entries.insert(
            key,
            Entry {
                value,
                inserted_at: now,
                expires_at,
                seq,
            },
        );
    }

    /// Remove a single entry. Returns whether anything was removed.
    pub fn invalidate(&self, key: &str) -> bool {
        match self.index.write() {
            Ok(mut index) => index.remove(key).is_some(),
            Err(_) => {
                tracing::warn!(key, "Cache index lock poisoned, skipping invalidation");
                false
            }
        }
    }

    /// Remove every entry whose key matches the pattern.
    pub fn invalidate_matching(&self, pattern: &KeyPattern) -> usize {
        let removed = self.invalidate_where(|key| pattern.matches(key));
        tracing::debug!(%pattern, removed, "Invalidated cache entries");
        removed
    }

    /// Remove every entry whose key satisfies the predicate.
    pub fn invalidate_where<F>(&self, predicate: F) -> usize
    where
        F: Fn(&str) -> bool,
    {
        let mut guard = match self.index.write() {
            Ok(guard) => guard,
            Err(_) => {
                tracing::warn!("Cache index lock poisoned, skipping bulk invalidation");
                return 0;
            }
        };
        let index = &mut *guard;

        let doomed: Vec<String> = index
            .entries
            .keys()
            .filter(|key| predicate(key))
            .cloned()
            .collect();
        for key in &doomed {
            index.remove(key);
        }
        doomed.len()
    }

    /// Remove all entries.
    ///
    /// Also recovers a poisoned index by replacing it wholesale.
    pub fn clear(&self) {
        let mut index = self
            .index
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *index = Index::default();
        drop(index);
        self.index.clear_poison();
    }

    /// Remove entries whose TTL has elapsed. Returns the number removed.
    pub fn sweep_expired(&self) -> usize {
        let now = self.clock.now();
        let mut guard = match self.index.write() {
            Ok(guard) => guard,
            Err(_) => {
                tracing::warn!("Cache index lock poisoned, skipping sweep");
                return 0;
            }
        };
        let index = &mut *guard;

        let expired: Vec<String> = index
            .entries
            .iter()
            .filter(|(_, entry)| !entry.is_live(now))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            index.remove(key);
        }

        let removed = expired.len();
        self.expirations.fetch_add(removed as u64, Ordering::Relaxed);
        removed
    }

    /// Snapshot of live keys, oldest insertion first.
    pub fn keys(&self) -> Vec<String> {
        let now = self.clock.now();
        match self.index.read() {
            Ok(index) => index
                .order
                .values()
                .filter(|key| {
                    index
                        .entries
                        .get(key.as_str())
                        .is_some_and(|entry| entry.is_live(now))
                })
                .cloned()
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    /// When the entry for `key` was stored, if it is live.
    pub fn inserted_at(&self, key: &str) -> Option<Timestamp> {
        let now = self.clock.now();
        let index = self.index.read().ok()?;
        index
            .entries
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.inserted_at)
    }

    /// Number of stored entries, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.index
            .read()
            .map(|index| index.entries.len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entry_count: self.len() as u64,
            evictions: self.evictions.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
        }
    }

    fn remove_if_expired(&self, key: &str, now: Timestamp) {
        let Ok(mut index) = self.index.write() else {
            return;
        };
        // Another writer may have replaced the entry since the read.
        if index.entries.get(key).is_some_and(|entry| !entry.is_live(now)) {
            index.remove(key);
            self.expirations.fetch_add(1, Ordering::Relaxed);
        }
    }
}
