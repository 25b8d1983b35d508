use std::sync::Arc;
use std::time::Duration;

use serde::de::{DeserializeOwned, IgnoredAny};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{StoreBackend, StoreError};

/// A cached value with the time it was written (epoch ms)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    pub data: T,
    pub timestamp: i64,
}

impl<T> CacheEntry<T> {
    pub fn new(data: T, timestamp: i64) -> Self {
        Self { data, timestamp }
    }

    /// Valid iff `now - timestamp <= ttl`
    pub fn is_valid_at(&self, ttl: Duration, now_ms: i64) -> bool {
        now_ms.saturating_sub(self.timestamp) <= ttl.as_millis() as i64
    }
}

type Clock = Arc<dyn Fn() -> i64 + Send + Sync>;

/// Namespaced key-value cache with TTL invalidation
///
/// Reads never fail: a missing, expired or unparsable entry degrades to the
/// caller's default. Entries that are not JSON at all are removed on sight;
/// well-formed JSON of another shape is left alone.
#[derive(Clone)]
pub struct PersistentStore {
    backend: Arc<dyn StoreBackend>,
    namespace: String,
    ttl: Duration,
    clock: Clock,
}

impl PersistentStore {
    /// Create a store over `backend`, scoping every key under `namespace`
    pub fn new(backend: Arc<dyn StoreBackend>, namespace: impl Into<String>, ttl: Duration) -> Self {
        Self {
            backend,
            namespace: namespace.into(),
            ttl,
            clock: Arc::new(|| chrono::Utc::now().timestamp_millis()),
        }
    }

    /// Replace the wall clock (epoch ms), mainly for TTL tests
    pub fn with_clock<F>(mut self, clock: F) -> Self
    where
        F: Fn() -> i64 + Send + Sync + 'static,
    {
        self.clock = Arc::new(clock);
        self
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn now_ms(&self) -> i64 {
        (self.clock)()
    }

    fn key(&self, key: &str) -> String {
        format!("{}.{}", self.namespace, key)
    }

    /// Write `data` wrapped in a timestamped `CacheEntry`
    pub fn set_cached_data<T: Serialize>(&self, key: &str, data: &T) -> Result<(), StoreError> {
        let entry = CacheEntry::new(data, self.now_ms());
        let json = serde_json::to_string(&entry)?;
        self.backend.write(&self.key(key), &json)
    }

    /// Cached data if present and within the default TTL, otherwise `default`
    pub fn get_cached_data<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        self.get_cached_data_within(key, self.ttl).unwrap_or(default)
    }

    /// Cached data if present and younger than `ttl`
    pub fn get_cached_data_within<T: DeserializeOwned>(&self, key: &str, ttl: Duration) -> Option<T> {
        let now = self.now_ms();
        self.entry::<T>(key)
            .filter(|entry| entry.is_valid_at(ttl, now))
            .map(|entry| entry.data)
    }

    /// Whether `key` holds an entry within the default TTL
    pub fn is_cache_valid(&self, key: &str) -> bool {
        let now = self.now_ms();
        self.entry::<IgnoredAny>(key)
            .is_some_and(|entry| entry.is_valid_at(self.ttl, now))
    }

    /// Load the raw entry regardless of age
    pub fn entry<T: DeserializeOwned>(&self, key: &str) -> Option<CacheEntry<T>> {
        self.load_value(key)
    }

    /// Write a plain value with no TTL envelope (preferences and the like)
    pub fn save_value<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        let json = serde_json::to_string(value)?;
        self.backend.write(&self.key(key), &json)
    }

    /// Read a plain value
    ///
    /// Text that is not JSON is purged. JSON that does not fit `T` is a miss
    /// but stays stored, since another reader may own that shape.
    pub fn load_value<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let full_key = self.key(key);
        let raw = match self.backend.read(&full_key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(key = %full_key, error = %e, "Failed to read cache entry");
                return None;
            }
        };

        let value: Value = match serde_json::from_str(&raw) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(key = %full_key, error = %e, "Purging unparsable cache entry");
                if let Err(e) = self.backend.remove(&full_key) {
                    tracing::warn!(key = %full_key, error = %e, "Failed to purge cache entry");
                }
                return None;
            }
        };

        match serde_json::from_value(value) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::debug!(key = %full_key, error = %e, "Cache entry has an unexpected shape");
                None
            }
        }
    }

    pub fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.backend.remove(&self.key(key))
    }

    /// Remove every entry in this namespace, leaving other namespaces alone
    pub fn clear(&self) -> Result<(), StoreError> {
        let prefix = format!("{}.", self.namespace);
        for key in self.backend.keys()? {
            if key.starts_with(&prefix) {
                self.backend.remove(&key)?;
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for PersistentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistentStore")
            .field("namespace", &self.namespace)
            .field("ttl", &self.ttl)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryBackend;
    use std::sync::atomic::{AtomicI64, Ordering};

    fn store_with_clock(backend: Arc<MemoryBackend>, now: Arc<AtomicI64>) -> PersistentStore {
        PersistentStore::new(backend, "opsconsole", Duration::from_secs(300))
            .with_clock(move || now.load(Ordering::SeqCst))
    }

    #[test]
    fn test_entry_expires_after_ttl() {
        let backend = Arc::new(MemoryBackend::new());
        let now = Arc::new(AtomicI64::new(1_000_000));
        let store = store_with_clock(backend, Arc::clone(&now));

        store.set_cached_data("functions", &vec!["checkout"]).unwrap();
        assert!(store.is_cache_valid("functions"));

        now.fetch_add(300_000, Ordering::SeqCst);
        assert!(store.is_cache_valid("functions"));
        assert_eq!(
            store.get_cached_data("functions", Vec::<String>::new()),
            vec!["checkout".to_string()]
        );

        now.fetch_add(1, Ordering::SeqCst);
        assert!(!store.is_cache_valid("functions"));
        assert!(store.get_cached_data("functions", Vec::<String>::new()).is_empty());
    }

    #[test]
    fn test_corrupt_entry_is_a_miss_and_purged() {
        let backend = Arc::new(MemoryBackend::new());
        backend.write("opsconsole.functions", "{not json").unwrap();
        let store = PersistentStore::new(backend.clone(), "opsconsole", Duration::from_secs(300));

        assert_eq!(store.get_cached_data("functions", 7u32), 7);
        assert_eq!(backend.read("opsconsole.functions").unwrap(), None);
    }

    #[test]
    fn test_wrong_shape_is_a_miss_but_kept() {
        let backend = Arc::new(MemoryBackend::new());
        backend
            .write("opsconsole.count", r#"{"data":"seven","timestamp":1}"#)
            .unwrap();
        let store = PersistentStore::new(backend.clone(), "opsconsole", Duration::from_secs(300));

        assert_eq!(store.get_cached_data("count", 0u32), 0);
        assert_eq!(store.get_cached_data("count", String::new()), "seven");
        assert_eq!(backend.keys().unwrap(), ["opsconsole.count"]);
    }

    #[test]
    fn test_validity_check_leaves_plain_values_alone() {
        let backend = Arc::new(MemoryBackend::new());
        let store = PersistentStore::new(backend.clone(), "opsconsole", Duration::from_secs(300));
        store
            .save_value("preferences", &serde_json::json!({"paused": true}))
            .unwrap();

        assert!(!store.is_cache_valid("preferences"));
        assert_eq!(
            store.load_value::<Value>("preferences"),
            Some(serde_json::json!({"paused": true}))
        );
    }

    #[test]
    fn test_namespaces_do_not_collide() {
        let backend = Arc::new(MemoryBackend::new());
        let ours = PersistentStore::new(backend.clone(), "opsconsole", Duration::from_secs(300));
        let theirs = PersistentStore::new(backend.clone(), "other", Duration::from_secs(300));

        ours.set_cached_data("filters", &1u8).unwrap();
        theirs.set_cached_data("filters", &2u8).unwrap();
        assert_eq!(ours.get_cached_data("filters", 0u8), 1);

        ours.clear().unwrap();
        assert_eq!(ours.get_cached_data("filters", 0u8), 0);
        assert_eq!(theirs.get_cached_data("filters", 0u8), 2);
    }

    #[test]
    fn test_plain_values_ignore_ttl() {
        let backend = Arc::new(MemoryBackend::new());
        let now = Arc::new(AtomicI64::new(0));
        let store = store_with_clock(backend, Arc::clone(&now));

        store.save_value("preferences", &true).unwrap();
        now.store(i64::MAX / 2, Ordering::SeqCst);
        assert_eq!(store.load_value::<bool>("preferences"), Some(true));
    }
}
