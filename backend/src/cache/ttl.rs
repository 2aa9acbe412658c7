//! In-memory cache with per-key time-to-live.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

pub const DEFAULT_TTL: Duration = Duration::from_secs(300);
pub const DEFAULT_MAX_SIZE: usize = 10_000;

/// Expired entries are swept every N inserts.
const CLEANUP_INTERVAL: usize = 100;

#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub name: String,
    pub total_entries: usize,
    pub expired_entries: usize,
    pub active_entries: usize,
}

struct Inner<V> {
    entries: HashMap<String, (V, Instant)>,
    inserts_since_cleanup: usize,
}

/// Thread-safe cache keyed by string.
///
/// Values are cloned out on [`get`](TtlCache::get); wrap large values in an
/// `Arc`. A `max_size` of 0 means unlimited.
pub struct TtlCache<V> {
    name: String,
    default_ttl: Duration,
    max_size: usize,
    inner: Mutex<Inner<V>>,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(name: impl Into<String>, default_ttl: Duration) -> Self {
        Self::with_max_size(name, default_ttl, DEFAULT_MAX_SIZE)
    }

    pub fn with_max_size(name: impl Into<String>, default_ttl: Duration, max_size: usize) -> Self {
        Self {
            name: name.into(),
            default_ttl,
            max_size,
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                inserts_since_cleanup: 0,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    // A panic while holding the lock cannot leave the map half-updated.
    fn lock(&self) -> MutexGuard<'_, Inner<V>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Value for `key` if present and not expired.
    pub fn get(&self, key: &str) -> Option<V> {
        let mut inner = self.lock();
        let (value, expires_at) = inner.entries.get(key)?;
        if Instant::now() <= *expires_at {
            return Some(value.clone());
        }
        inner.entries.remove(key);
        None
    }

    pub fn insert(&self, key: impl Into<String>, value: V) {
        self.insert_with_ttl(key, value, self.default_ttl);
    }

    pub fn insert_with_ttl(&self, key: impl Into<String>, value: V, ttl: Duration) {
        let mut inner = self.lock();
        inner.entries.insert(key.into(), (value, Instant::now() + ttl));
        inner.inserts_since_cleanup += 1;

        let over_size = self.max_size > 0 && inner.entries.len() > self.max_size;
        if inner.inserts_since_cleanup >= CLEANUP_INTERVAL || over_size {
            inner.inserts_since_cleanup = 0;
            self.cleanup_locked(&mut inner);
        }
    }

    /// Remove expired entries, then evict the soonest-expiring ones above `max_size`.
    fn cleanup_locked(&self, inner: &mut Inner<V>) {
        let now = Instant::now();
        inner.entries.retain(|_, (_, expires_at)| *expires_at >= now);

        if self.max_size > 0 && inner.entries.len() > self.max_size {
            let mut by_expiry: Vec<(String, Instant)> = inner
                .entries
                .iter()
                .map(|(k, (_, exp))| (k.clone(), *exp))
                .collect();
            by_expiry.sort_by_key(|(_, exp)| *exp);

            let excess = inner.entries.len() - self.max_size;
            for (key, _) in by_expiry.into_iter().take(excess) {
                inner.entries.remove(&key);
            }
        }
    }

    /// Drop entries whose key contains `pattern`, or everything when `None`.
    /// Returns the number of entries removed.
    pub fn invalidate(&self, pattern: Option<&str>) -> usize {
        let mut inner = self.lock();
        let before = inner.entries.len();
        match pattern {
            None => inner.entries.clear(),
            Some(p) => inner.entries.retain(|k, _| !k.contains(p)),
        }
        before - inner.entries.len()
    }

    /// Number of stored entries, expired ones included until swept.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.lock();
        let now = Instant::now();
        let total = inner.entries.len();
        let expired = inner.entries.values().filter(|(_, exp)| now > *exp).count();
        CacheStats {
            name: self.name.clone(),
            total_entries: total,
            expired_entries: expired,
            active_entries: total - expired,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_get() {
        let cache = TtlCache::new("test", DEFAULT_TTL);
        cache.insert("screener:legacy:fo", 42);
        assert_eq!(cache.get("screener:legacy:fo"), Some(42));
        assert_eq!(cache.get("screener:tff:fo"), None);
    }

    #[test]
    fn test_expired_entry_removed_on_get() {
        let cache = TtlCache::new("test", DEFAULT_TTL);
        cache.insert_with_ttl("k", "v", Duration::ZERO);
        std::thread::sleep(Duration::from_millis(5));

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.stats().expired_entries, 1);
        assert_eq!(cache.get("k"), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_invalidate_pattern() {
        let cache = TtlCache::new("test", DEFAULT_TTL);
        cache.insert("screener:legacy:fo", 1);
        cache.insert("screener:legacy:co", 2);
        cache.insert("screener:tff:fo", 3);

        assert_eq!(cache.invalidate(Some("legacy")), 2);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.invalidate(None), 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_max_size_evicts_soonest_expiring() {
        let cache = TtlCache::with_max_size("test", DEFAULT_TTL, 2);
        cache.insert_with_ttl("short", 1, Duration::from_secs(10));
        cache.insert_with_ttl("long", 2, Duration::from_secs(1000));
        cache.insert_with_ttl("medium", 3, Duration::from_secs(100));

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("short"), None);
        assert_eq!(cache.get("long"), Some(2));
        assert_eq!(cache.get("medium"), Some(3));
    }

    #[test]
    fn test_unlimited_size() {
        let cache = TtlCache::with_max_size("test", DEFAULT_TTL, 0);
        for i in 0..250 {
            cache.insert(format!("k{}", i), i);
        }
        assert_eq!(cache.len(), 250);
    }
}
