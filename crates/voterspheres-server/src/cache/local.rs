//! In-process fallback cache
//!
//! Entries expire lazily: an expired entry is dropped when it is read, or
//! when the map is full and room is needed for a new key.

use dashmap::DashMap;
use std::time::{Duration, Instant};

struct Entry {
    value: String,
    expires_at: Instant,
}

pub struct LocalCache {
    entries: DashMap<String, Entry>,
    capacity: usize,
}

impl LocalCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        let now = Instant::now();
        {
            let entry = self.entries.get(key)?;
            if entry.expires_at > now {
                return Some(entry.value.clone());
            }
        }
        // The read guard must be gone before taking the shard's write lock
        self.entries.remove_if(key, |_, entry| entry.expires_at <= now);
        None
    }

    pub fn set(&self, key: &str, value: String, ttl: Duration) {
        if self.entries.len() >= self.capacity && !self.entries.contains_key(key) {
            self.make_room();
        }
        self.entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    pub fn delete(&self, key: &str) {
        self.entries.remove(key);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every expired entry, returning how many went
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at > now);
        before.saturating_sub(self.entries.len())
    }

    fn make_room(&self) {
        if self.purge_expired() > 0 && self.entries.len() < self.capacity {
            return;
        }
        let soonest = self
            .entries
            .iter()
            .min_by_key(|entry| entry.value().expires_at)
            .map(|entry| entry.key().clone());
        if let Some(key) = soonest {
            self.entries.remove(&key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_returns_live_entry() {
        let cache = LocalCache::new(10);
        cache.set("a", "1".into(), Duration::from_secs(60));
        assert_eq!(cache.get("a").as_deref(), Some("1"));
        assert_eq!(cache.get("b"), None);
    }

    #[test]
    fn test_expired_entry_is_evicted_on_read() {
        let cache = LocalCache::new(10);
        cache.set("a", "1".into(), Duration::ZERO);
        assert_eq!(cache.get("a"), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_capacity_evicts_soonest_expiry() {
        let cache = LocalCache::new(2);
        cache.set("short", "1".into(), Duration::from_secs(10));
        cache.set("long", "2".into(), Duration::from_secs(600));
        cache.set("new", "3".into(), Duration::from_secs(300));

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("short"), None);
        assert_eq!(cache.get("long").as_deref(), Some("2"));
        assert_eq!(cache.get("new").as_deref(), Some("3"));
    }

    #[test]
    fn test_overwrite_does_not_evict() {
        let cache = LocalCache::new(1);
        cache.set("a", "1".into(), Duration::from_secs(60));
        cache.set("a", "2".into(), Duration::from_secs(60));
        assert_eq!(cache.get("a").as_deref(), Some("2"));
    }
}
