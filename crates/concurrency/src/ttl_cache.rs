//! Generic TTL cache.
//!
//! Used to cache branch-membership lookups for the Try-Branch Resolver
//! (C8), which would otherwise issue a `json-pushes` call per resolve.
//! `DashMap` gives the same lock-free-read/sharded-write shape the other
//! stores in this workspace use.

use dashmap::DashMap;
use rustc_hash::FxBuildHasher;
use std::hash::Hash;
use std::time::{Duration, Instant};

struct Entry<V> {
    value: V,
    expires_at: Instant,
}

/// A cache whose entries expire `ttl` after insertion.
pub struct TtlCache<K, V> {
    entries: DashMap<K, Entry<V>, FxBuildHasher>,
    ttl: Duration,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Build a cache with the given time-to-live.
    pub fn new(ttl: Duration) -> Self {
        TtlCache {
            entries: DashMap::with_hasher(FxBuildHasher::default()),
            ttl,
        }
    }

    /// Look up `key`, returning `None` if absent or expired. Expired entries
    /// are lazily evicted on the next access, rather than by a sweep.
    pub fn get(&self, key: &K) -> Option<V> {
        if let Some(entry) = self.entries.get(key) {
            if entry.expires_at > Instant::now() {
                return Some(entry.value.clone());
            }
        }
        self.entries.remove(key);
        None
    }

    /// Insert or refresh `key` with a fresh TTL.
    pub fn insert(&self, key: K, value: V) {
        self.entries.insert(
            key,
            Entry {
                value,
                expires_at: Instant::now() + self.ttl,
            },
        );
    }

    /// Number of entries, including any not-yet-evicted expired ones.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True iff the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn entries_expire_after_ttl() {
        let cache: TtlCache<String, bool> = TtlCache::new(Duration::from_millis(20));
        cache.insert("try".to_string(), true);
        assert_eq!(cache.get(&"try".to_string()), Some(true));
        sleep(Duration::from_millis(40));
        assert_eq!(cache.get(&"try".to_string()), None);
    }

    #[test]
    fn insert_refreshes_ttl() {
        let cache: TtlCache<String, u32> = TtlCache::new(Duration::from_secs(1));
        cache.insert("a".to_string(), 1);
        cache.insert("a".to_string(), 2);
        assert_eq!(cache.get(&"a".to_string()), Some(2));
    }
}
