//! Generic expiring cache.
//!
//! A bounded map with per-entry insertion timestamps. Entries expire after a
//! fixed TTL (checked lazily on read) and the map evicts least-recently-used
//! entries once it grows past its size bound. A read hit refreshes recency
//! but not the TTL clock. A TTL of zero disables the cache entirely: writes
//! are dropped and reads always miss.
//!
//! Three instances back the orchestrator: probe results keyed by URL,
//! completed deliveries keyed by job identity, and pending format selections
//! keyed by token.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Mutex;
use std::time::{Duration, Instant};

struct Entry<V> {
    value: V,
    inserted_at: Instant,
    touched: u64,
}

struct Inner<K, V> {
    map: HashMap<K, Entry<V>>,
    // Monotonic access counter; the entry with the smallest value is the
    // least recently used.
    clock: u64,
}

/// Thread-safe TTL + LRU cache. Values are cloned out on read.
pub struct ExpiringCache<K, V> {
    inner: Mutex<Inner<K, V>>,
    ttl: Duration,
    max_entries: usize,
}

impl<K, V> ExpiringCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Create a cache holding at most `max_entries` values for `ttl` each.
    /// `max_entries` is clamped to at least 1; `ttl` of zero disables caching.
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                map: HashMap::new(),
                clock: 0,
            }),
            ttl,
            max_entries: max_entries.max(1),
        }
    }

    /// Whether writes are accepted at all.
    pub fn enabled(&self) -> bool {
        !self.ttl.is_zero()
    }

    /// Look up `key`, evicting it first if its TTL has elapsed.
    pub fn get(&self, key: &K) -> Option<V> {
        if !self.enabled() {
            return None;
        }
        let mut inner = self.inner.lock().unwrap();
        inner.clock += 1;
        let clock = inner.clock;
        let expired = matches!(
            inner.map.get(key),
            Some(entry) if entry.inserted_at.elapsed() >= self.ttl
        );
        if expired {
            inner.map.remove(key);
            return None;
        }
        if let Some(entry) = inner.map.get_mut(key) {
            entry.touched = clock;
            return Some(entry.value.clone());
        }
        None
    }

    /// Insert or replace `key`, evicting LRU entries past the size bound.
    pub fn set(&self, key: K, value: V) {
        if !self.enabled() {
            return;
        }
        let mut inner = self.inner.lock().unwrap();
        inner.clock += 1;
        let clock = inner.clock;
        inner.map.insert(
            key,
            Entry {
                value,
                inserted_at: Instant::now(),
                touched: clock,
            },
        );
        while inner.map.len() > self.max_entries {
            let oldest = inner
                .map
                .iter()
                .min_by_key(|(_, e)| e.touched)
                .map(|(k, _)| k.clone());
            match oldest {
                Some(k) => {
                    inner.map.remove(&k);
                }
                None => break,
            }
        }
    }

    /// Drop `key` if present. Used when a cached value turns out stale
    /// (e.g. a platform file handle the transport no longer accepts).
    pub fn remove(&self, key: &K) {
        let mut inner = self.inner.lock().unwrap();
        inner.map.remove(key);
    }

    /// Current entry count, counting expired-but-unread entries.
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().map.len()
    }

    /// True when no entries are stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
