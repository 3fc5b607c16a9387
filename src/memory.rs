//! An in-process cache with per-entry expiry.

use std::time::{Duration, Instant};

use ahash::AHashMap;
use parking_lot::Mutex;

use crate::guard::{Cache, CacheValue};

struct Entry {
    value: CacheValue,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

/// A [`Cache`] held in memory.
///
/// A `ttl` of zero stores the entry without expiry. Expired entries read as
/// absent and are evicted on access or by [`purge_expired`](MemoryCache::purge_expired).
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<AHashMap<String, Entry>>,
}

impl MemoryCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes `key`, returning its value if it was live.
    pub fn remove(&self, key: &str) -> Option<CacheValue> {
        let entry = self.entries.lock().remove(key)?;
        if entry.is_expired(Instant::now()) {
            return None;
        }
        Some(entry.value)
    }

    /// Evicts every expired entry and returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        before - entries.len()
    }

    /// Number of stored entries, including expired ones not yet evicted.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Cache for MemoryCache {
    fn get(&self, key: &str) -> Option<CacheValue> {
        let mut entries = self.entries.lock();
        let entry = entries.get(key)?;

        if entry.is_expired(Instant::now()) {
            entries.remove(key);
            return None;
        }

        Some(CacheValue::clone(&entry.value))
    }

    fn set(&self, key: &str, value: CacheValue, ttl: Duration) {
        let expires_at = if ttl.is_zero() {
            None
        } else {
            Instant::now().checked_add(ttl)
        };

        self.entries
            .lock()
            .insert(key.to_string(), Entry { value, expires_at });
    }
}
