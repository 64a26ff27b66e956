//! Shared Cache Handle
//!
//! Thread-safe, cloneable access to a `CacheStore` for async callers.
//!
//! Each operation takes the store's lock exactly once, so eviction, index
//! pruning and recency updates are never observed half-applied. Suppliers
//! passed to `get_or_set` run outside the lock.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, RwLock, RwLockWriteGuard};

use crate::cache::{
    CacheMetrics, CacheStore, CacheValue, EntryInfo, EntryOptions, KeyPattern, Ttl,
};
use crate::config::CacheConfig;
use crate::error::{CacheError, Result};

type Gates = Mutex<HashMap<String, Arc<AsyncMutex<()>>>>;

// == Shared Cache ==
/// Cloneable handle to a cache shared across tasks.
///
/// Construct one per component that needs its own cache and pass clones
/// to whoever needs access; there is no process-wide instance.
pub struct SharedCache<V> {
    /// Thread-safe cache store
    inner: Arc<RwLock<CacheStore<V>>>,
    /// Per-key gates for single-flight lookups
    gates: Arc<Gates>,
}

impl<V> Clone for SharedCache<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            gates: Arc::clone(&self.gates),
        }
    }
}

impl<V> std::fmt::Debug for SharedCache<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedCache").finish_non_exhaustive()
    }
}

impl<V: CacheValue> SharedCache<V> {
    /// Wraps an existing store.
    pub fn new(store: CacheStore<V>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(store)),
            gates: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Creates a new shared cache from configuration.
    pub fn from_config(config: CacheConfig) -> Self {
        Self::new(CacheStore::new(config))
    }

    /// Exclusive access for several operations under one lock.
    pub async fn lock(&self) -> RwLockWriteGuard<'_, CacheStore<V>> {
        self.inner.write().await
    }

    pub async fn set(&self, key: impl Into<String>, value: V, ttl: Option<u64>) -> Result<()> {
        self.inner.write().await.set(key, value, ttl)
    }

    pub async fn set_with(
        &self,
        key: impl Into<String>,
        value: V,
        options: EntryOptions,
    ) -> Result<()> {
        self.inner.write().await.set_with(key, value, options)
    }

    // Write lock: a hit moves the key in the recency list
    pub async fn get(&self, key: &str) -> Option<V> {
        self.inner.write().await.get(key)
    }

    pub async fn has(&self, key: &str) -> bool {
        self.inner.write().await.has(key)
    }

    pub async fn delete(&self, key: &str) -> bool {
        self.inner.write().await.delete(key)
    }

    pub async fn clear(&self) {
        self.inner.write().await.clear()
    }

    pub async fn update_ttl(&self, key: &str, ttl: impl Into<Ttl>) -> Result<()> {
        self.inner.write().await.update_ttl(key, ttl)
    }

    pub async fn invalidate_by_tags<S: AsRef<str>>(&self, tags: &[S]) -> Vec<String> {
        self.inner.write().await.invalidate_by_tags(tags)
    }

    pub async fn invalidate_pattern(&self, pattern: &KeyPattern) -> Result<Vec<String>> {
        self.inner.write().await.invalidate_pattern(pattern)
    }

    pub async fn mget<S: AsRef<str>>(&self, keys: &[S]) -> Vec<Option<V>> {
        self.inner.write().await.mget(keys)
    }

    pub async fn mset<I, K>(&self, entries: I, ttl: Option<u64>) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
    {
        self.inner.write().await.mset(entries, ttl)
    }

    pub async fn sweep_expired(&self) -> usize {
        self.inner.write().await.sweep_expired()
    }

    pub async fn metrics(&self) -> CacheMetrics {
        self.inner.read().await.metrics()
    }

    pub async fn entry_info(&self, key: &str) -> Option<EntryInfo> {
        self.inner.read().await.entry_info(key)
    }

    pub async fn keys(&self) -> Vec<String> {
        self.inner.read().await.keys()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }

    // == Get Or Set ==
    /// Returns the cached value, or awaits `supplier`, stores and returns its
    /// value.
    ///
    /// The supplier runs without holding the cache lock. Concurrent misses
    /// on the same key may each run their supplier; use
    /// [`SharedCache::get_or_set_coalesced`] to prevent that.
    pub async fn get_or_set<F, Fut, E>(
        &self,
        key: &str,
        supplier: F,
        options: EntryOptions,
    ) -> std::result::Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<V, E>>,
        E: From<CacheError>,
    {
        if let Some(value) = self.get(key).await {
            return Ok(value);
        }
        let value = supplier().await?;
        self.set_with(key, value.clone(), options).await?;
        Ok(value)
    }

    /// Single-flight `get_or_set`: callers on the same key take turns, so
    /// after one supplier stores its value the rest are served from cache.
    ///
    /// Callers on different keys do not wait on each other.
    pub async fn get_or_set_coalesced<F, Fut, E>(
        &self,
        key: &str,
        supplier: F,
        options: EntryOptions,
    ) -> std::result::Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<V, E>>,
        E: From<CacheError>,
    {
        let gate = GateGuard::acquire(&self.gates, key);
        let _turn = gate.gate.lock().await;
        self.get_or_set(key, supplier, options).await
    }
}

/// Holds a reference to one key's gate; drops the map entry once no other
/// caller references it, including when the caller's future is cancelled.
struct GateGuard<'a> {
    gates: &'a Gates,
    key: String,
    gate: Arc<AsyncMutex<()>>,
}

impl<'a> GateGuard<'a> {
    fn acquire(gates: &'a Gates, key: &str) -> Self {
        let gate = gates
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key.to_string())
            .or_default()
            .clone();
        Self {
            gates,
            key: key.to_string(),
            gate,
        }
    }
}

impl Drop for GateGuard<'_> {
    fn drop(&mut self) {
        let mut gates = self.gates.lock().unwrap_or_else(PoisonError::into_inner);
        // One reference in the map, one here: nobody else is waiting
        if Arc::strong_count(&self.gate) == 2 {
            gates.remove(&self.key);
        }
    }
}
