//! Generic expiring key-value cache.
//!
//! Every TTL-bound structure in Warden (flagged URLs, reinitiation permits,
//! auto-scan history, notification dedupe) is an instance of this cache so
//! that expiry semantics live in exactly one place.
//!
//! ## Semantics
//!
//! - Entries carry their insertion time and a TTL (the cache default, or a
//!   per-entry override).
//! - Expired entries are unreachable through the public API immediately, even
//!   before a sweep removes them.
//! - [`ExpiringCache::consume`] is the single-use primitive: it removes the
//!   entry on a hit, so a second lookup misses.
//! - The janitor drains expired entries periodically through the [`Sweep`]
//!   trait.
//!
//! ## Usage
//!
//! ```
//! use std::time::Duration;
//! use warden_core::cache::ExpiringCache;
//!
//! let permits: ExpiringCache<String, ()> = ExpiringCache::new("permits", Duration::from_secs(5));
//! permits.insert("https://example.com/a.exe".to_string(), ());
//!
//! // Single use: the first consume hits, the second misses.
//! assert!(permits.consume(&"https://example.com/a.exe".to_string()).is_some());
//! assert!(permits.consume(&"https://example.com/a.exe".to_string()).is_none());
//! ```

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;

/// A cache that can be swept by the janitor.
pub trait Sweep: Send + Sync {
    /// Removes expired entries, returning how many were purged.
    fn sweep(&self) -> usize;

    /// Cache name for logging.
    fn name(&self) -> &str;
}

/// A single cached entry with its own expiry.
#[derive(Debug, Clone)]
struct Entry<V> {
    value: V,
    inserted_at: Instant,
    ttl: Duration,
}

impl<V> Entry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.inserted_at) >= self.ttl
    }
}

/// Generic TTL key-value store.
///
/// `Clone` shares the underlying map, so one instance can be handed to both
/// a feature and the janitor.
#[derive(Debug)]
pub struct ExpiringCache<K, V> {
    name: String,
    default_ttl: Duration,
    entries: Arc<RwLock<HashMap<K, Entry<V>>>>,
}

impl<K, V> Clone for ExpiringCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            default_ttl: self.default_ttl,
            entries: Arc::clone(&self.entries),
        }
    }
}

impl<K, V> ExpiringCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Creates a new cache with a default TTL for its entries.
    pub fn new(name: impl Into<String>, default_ttl: Duration) -> Self {
        Self {
            name: name.into(),
            default_ttl,
            entries: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Returns the default TTL.
    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Inserts a value with the default TTL, replacing any previous entry.
    pub fn insert(&self, key: K, value: V) {
        self.insert_with_ttl(key, value, self.default_ttl);
    }

    /// Inserts a value with a per-entry TTL override.
    pub fn insert_with_ttl(&self, key: K, value: V, ttl: Duration) {
        let entry = Entry {
            value,
            inserted_at: Instant::now(),
            ttl,
        };
        self.entries.write().insert(key, entry);
    }

    /// Returns a clone of the live value for `key`, if any.
    ///
    /// Expired entries miss; they are left for the next sweep.
    pub fn get(&self, key: &K) -> Option<V> {
        let now = Instant::now();
        let entries = self.entries.read();
        entries
            .get(key)
            .filter(|e| !e.is_expired(now))
            .map(|e| e.value.clone())
    }

    /// Returns whether a live entry exists for `key`.
    pub fn contains(&self, key: &K) -> bool {
        self.get(key).is_some()
    }

    /// Removes and returns the live value for `key`.
    ///
    /// This is the single-use lookup: after a hit the entry is gone. An
    /// expired entry is removed but reported as a miss.
    pub fn consume(&self, key: &K) -> Option<V> {
        let now = Instant::now();
        let mut entries = self.entries.write();
        let entry = entries.remove(key)?;
        if entry.is_expired(now) {
            return None;
        }
        Some(entry.value)
    }

    /// Removes an entry regardless of expiry. Returns whether one existed.
    pub fn remove(&self, key: &K) -> bool {
        self.entries.write().remove(key).is_some()
    }

    /// Number of live (unexpired) entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        let entries = self.entries.read();
        entries.values().filter(|e| !e.is_expired(now)).count()
    }

    /// Returns true if no live entries exist.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes every entry, live or not.
    pub fn clear(&self) {
        self.entries.write().clear();
    }

    /// Returns the keys of all live entries.
    pub fn live_keys(&self) -> Vec<K> {
        let now = Instant::now();
        let entries = self.entries.read();
        entries
            .iter()
            .filter(|(_, e)| !e.is_expired(now))
            .map(|(k, _)| k.clone())
            .collect()
    }
}

impl<K, V> Sweep for ExpiringCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync,
    V: Clone + Send + Sync,
{
    fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, e| !e.is_expired(now));
        before - entries.len()
    }

    fn name(&self) -> &str {
        &self.name
    }
}
