//! Record cache collaborator.
//!
//! The engine only needs `get`/`set(key, value, ttl)` from a cache; where the
//! records actually live (process memory, a shared store) is up to the
//! caller. [`MemoryCache`] is the in-process implementation.

use crate::types::ParsedRecord;
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Memoizer for finished lookups, keyed by normalized domain.
pub trait RecordCache: Send + Sync {
    /// Cached record for `key`, if present and not expired.
    fn get(&self, key: &str) -> Option<ParsedRecord>;

    /// Store `value` under `key` for `ttl`.
    fn set(&self, key: &str, value: ParsedRecord, ttl: Duration);
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: ParsedRecord,
    inserted_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    fn is_expired(&self) -> bool {
        self.inserted_at.elapsed() > self.ttl
    }
}

/// Entry count at which `set` sweeps out expired entries first.
pub const DEFAULT_SWEEP_THRESHOLD: usize = 1024;

/// Thread-safe TTL map of parsed records.
///
/// Expired entries are hidden on read. Once the map holds
/// `sweep_threshold` entries, each insert first drops the expired ones;
/// [`MemoryCache::purge_expired`] does the same on demand.
#[derive(Debug)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    sweep_threshold: usize,
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            sweep_threshold: DEFAULT_SWEEP_THRESHOLD,
        }
    }
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sweep_threshold(mut self, threshold: usize) -> Self {
        self.sweep_threshold = threshold.max(1);
        self
    }

    /// Number of stored entries, expired ones included.
    pub fn len(&self) -> usize {
        match self.entries.read() {
            Ok(entries) => entries.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        match self.entries.write() {
            Ok(mut entries) => entries.clear(),
            Err(poisoned) => poisoned.into_inner().clear(),
        }
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let mut entries = match self.entries.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("Record cache write lock poisoned, recovering");
                poisoned.into_inner()
            }
        };
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired());
        let removed = before - entries.len();
        if removed > 0 {
            debug!(removed, "purged expired cache entries");
        }
        removed
    }
}

impl RecordCache for MemoryCache {
    fn get(&self, key: &str) -> Option<ParsedRecord> {
        let entries = match self.entries.read() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("Record cache read lock poisoned, recovering");
                poisoned.into_inner()
            }
        };
        let entry = entries.get(key)?;
        if entry.is_expired() {
            debug!(key, "cache entry expired");
            None
        } else {
            Some(entry.value.clone())
        }
    }

    fn set(&self, key: &str, value: ParsedRecord, ttl: Duration) {
        let mut entries = match self.entries.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("Record cache write lock poisoned, recovering");
                poisoned.into_inner()
            }
        };
        if entries.len() >= self.sweep_threshold && !entries.contains_key(key) {
            let before = entries.len();
            entries.retain(|_, entry| !entry.is_expired());
            debug!(removed = before - entries.len(), "swept expired cache entries");
        }
        entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                inserted_at: Instant::now(),
                ttl,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_then_get() {
        let cache = MemoryCache::new();
        cache.set(
            "example.com",
            ParsedRecord::new("example.com", "com"),
            Duration::from_secs(60),
        );

        let hit = cache.get("example.com").unwrap();
        assert_eq!(hit.domain_name, "example.com");
        assert!(cache.get("other.com").is_none());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_expired_entries_are_hidden_and_purged() {
        let cache = MemoryCache::new();
        cache.set("a.com", ParsedRecord::new("a.com", "com"), Duration::ZERO);
        cache.set("b.com", ParsedRecord::new("b.com", "com"), Duration::from_secs(60));
        std::thread::sleep(Duration::from_millis(5));

        assert!(cache.get("a.com").is_none());
        assert!(cache.get("b.com").is_some());
        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_set_sweeps_expired_entries_past_threshold() {
        let cache = MemoryCache::new().with_sweep_threshold(2);
        cache.set("a.com", ParsedRecord::new("a.com", "com"), Duration::ZERO);
        cache.set("b.com", ParsedRecord::new("b.com", "com"), Duration::ZERO);
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(cache.len(), 2);

        cache.set("c.com", ParsedRecord::new("c.com", "com"), Duration::from_secs(60));
        assert_eq!(cache.len(), 1);
        assert!(cache.get("c.com").is_some());
    }

    #[test]
    fn test_set_replaces_previous_value() {
        let cache = MemoryCache::new();
        let ttl = Duration::from_secs(60);
        cache.set("a.com", ParsedRecord::new("a.com", "com"), ttl);

        let mut available = ParsedRecord::new("a.com", "com");
        available.is_available = true;
        cache.set("a.com", available, ttl);

        assert!(cache.get("a.com").unwrap().is_available);
        cache.clear();
        assert!(cache.is_empty());
    }
}
