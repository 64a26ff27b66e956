//! Cache Store Module
//!
//! Main cache engine combining HashMap storage with LRU tracking, TTL
//! expiration, and tag/pattern invalidation.
//!
//! Every removal, whatever triggered it, goes through `remove_entry` so the
//! entry map, recency list, tag index and size counters move together.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::cache::{
    CacheEntry, CacheEvent, CacheMetrics, CacheObserver, CacheStats, CacheValue, Clock,
    EntryInfo, EntryOptions, ExpiryQueue, KeyPattern, LruTracker, RemovalReason, SystemClock,
    TagIndex, Ttl, MAX_KEY_LENGTH,
};
use crate::config::{CacheConfig, CapacityPolicy};
use crate::error::{CacheError, Result};

// == Cache Store ==
/// Size-bounded cache with LRU eviction, TTL support and tag/pattern
/// invalidation.
///
/// Not internally synchronized; wrap it in [`crate::SharedCache`] to share
/// it across tasks.
pub struct CacheStore<V> {
    /// Key-value storage
    entries: HashMap<String, CacheEntry<V>>,
    /// LRU access tracker
    lru: LruTracker,
    /// Pending expirations for the sweep
    expiry: ExpiryQueue,
    tags: TagIndex,
    /// Performance statistics
    stats: CacheStats,
    config: CacheConfig,
    clock: Arc<dyn Clock>,
    observer: Option<Arc<dyn CacheObserver>>,
    next_generation: u64,
    /// Entries carrying an expiration, i.e. live schedules in `expiry`
    expiring_entries: usize,
}

impl<V> fmt::Debug for CacheStore<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheStore")
            .field("entries", &self.entries.len())
            .field("stats", &self.stats)
            .field("config", &self.config)
            .field("clock", &self.clock)
            .field("has_observer", &self.observer.is_some())
            .finish_non_exhaustive()
    }
}

impl<V: CacheValue> CacheStore<V> {
    // == Constructor ==
    /// Creates a new CacheStore reading time from the system clock.
    pub fn new(config: CacheConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Creates a new CacheStore with an explicit time source.
    pub fn with_clock(config: CacheConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: HashMap::new(),
            lru: LruTracker::new(),
            expiry: ExpiryQueue::new(),
            tags: TagIndex::new(),
            stats: CacheStats::new(config.enable_metrics),
            config,
            clock,
            observer: None,
            next_generation: 0,
            expiring_entries: 0,
        }
    }

    /// Attaches a lifecycle observer.
    pub fn with_observer(mut self, observer: Arc<dyn CacheObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn set_observer(&mut self, observer: Option<Arc<dyn CacheObserver>>) {
        self.observer = observer;
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    // == Set ==
    /// Stores a key-value pair.
    ///
    /// `ttl` of `None` or `Some(0)` applies the configured default TTL.
    pub fn set(&mut self, key: impl Into<String>, value: V, ttl: Option<u64>) -> Result<()> {
        self.set_with(key, value, EntryOptions::new().ttl(ttl))
    }

    /// Stores a key-value pair with tags, TTL and size options.
    ///
    /// An existing entry under the same key is removed first. If the new
    /// entry does not fit, least recently used entries are evicted until it
    /// does or the store is empty. Under the lenient policy the entry is
    /// then inserted even if it alone exceeds the capacity; under the strict
    /// policy such an entry is rejected before anything is touched.
    pub fn set_with(
        &mut self,
        key: impl Into<String>,
        value: V,
        options: EntryOptions,
    ) -> Result<()> {
        let key = key.into();
        validate_key(&key)?;

        let size_bytes = options.size_hint.unwrap_or_else(|| value.size_bytes());
        if self.config.capacity_policy == CapacityPolicy::Strict
            && size_bytes > self.config.max_size_bytes
        {
            warn!(
                %key,
                size_bytes,
                max_size_bytes = self.config.max_size_bytes,
                "rejecting oversized entry"
            );
            return Err(CacheError::CapacityExceeded {
                key,
                size_bytes,
                max_size_bytes: self.config.max_size_bytes,
            });
        }

        if self.entries.contains_key(&key) {
            self.remove_entry(&key, RemovalReason::Replaced);
        }
        self.evict_for(size_bytes);

        let now = self.clock.now_ms();
        let generation = self.bump_generation();
        let ttl_ms = options.ttl.resolve_ms(self.config.default_ttl_seconds);
        let tags: BTreeSet<String> = options.tags.into_iter().collect();
        let entry = CacheEntry::new(
            key.clone(),
            value,
            now,
            ttl_ms,
            size_bytes,
            tags,
            generation,
        );

        if let Some(expires_at) = entry.expires_at {
            self.expiry.schedule(&key, expires_at, generation);
            self.expiring_entries += 1;
        }
        self.tags.insert(&key, &entry.tags);
        self.lru.touch(&key);
        self.stats.entry_added(size_bytes);
        self.stats.record_set();
        self.entries.insert(key.clone(), entry);

        self.notify(|| CacheEvent::Set { key, size_bytes });
        self.maybe_compact();
        Ok(())
    }

    // == Get ==
    /// Retrieves a value by key.
    ///
    /// Expired entries are removed and counted as misses. A hit bumps the
    /// entry's access metadata and makes it the most recently used.
    pub fn get(&mut self, key: &str) -> Option<V> {
        let now = self.clock.now_ms();
        match self.entries.get(key).map(|entry| entry.is_expired(now)) {
            None => {
                self.record_miss(key);
                return None;
            }
            Some(true) => {
                self.remove_entry(key, RemovalReason::Expired);
                self.record_miss(key);
                return None;
            }
            Some(false) => {}
        }

        let entry = self.entries.get_mut(key)?;
        entry.record_access(now);
        let value = entry.value.clone();
        self.lru.touch(key);
        self.stats.record_hit();
        self.notify(|| CacheEvent::Hit {
            key: key.to_string(),
        });
        Some(value)
    }

    // == Has ==
    /// Checks for a live entry without touching recency or hit/miss counters.
    ///
    /// Expired entries found here are removed.
    pub fn has(&mut self, key: &str) -> bool {
        let now = self.clock.now_ms();
        match self.entries.get(key).map(|entry| entry.is_expired(now)) {
            Some(false) => true,
            Some(true) => {
                self.remove_entry(key, RemovalReason::Expired);
                false
            }
            None => false,
        }
    }

    // == Delete ==
    /// Removes an entry by key. Returns false if there was nothing to remove.
    pub fn delete(&mut self, key: &str) -> bool {
        let removed = self.remove_entry(key, RemovalReason::Deleted).is_some();
        self.maybe_compact();
        removed
    }

    // == Clear ==
    /// Drops every entry and pending expiration. Cumulative metrics are kept;
    /// see [`CacheStore::reset_metrics`].
    pub fn clear(&mut self) {
        let entries = self.entries.len();
        self.entries.clear();
        self.lru.clear();
        self.expiry.clear();
        self.tags.clear();
        self.expiring_entries = 0;
        self.stats.reset_live();
        info!(entries, "cache cleared");
        self.notify(|| CacheEvent::Cleared { entries });
    }

    pub fn reset_metrics(&mut self) {
        self.stats.reset_counters();
    }

    // == Update TTL ==
    /// Re-arms the TTL of a live entry relative to now.
    ///
    /// The previous schedule becomes stale and will be ignored by the sweep.
    pub fn update_ttl(&mut self, key: &str, ttl: impl Into<Ttl>) -> Result<()> {
        if !self.has(key) {
            return Err(CacheError::NotFound(key.to_string()));
        }
        let now = self.clock.now_ms();
        let generation = self.bump_generation();
        let ttl_ms = ttl.into().resolve_ms(self.config.default_ttl_seconds);

        let entry = self
            .entries
            .get_mut(key)
            .ok_or_else(|| CacheError::NotFound(key.to_string()))?;
        let was_expiring = entry.expires_at.is_some();
        entry.reschedule(now, ttl_ms, generation);
        let is_expiring = entry.expires_at.is_some();
        if let Some(expires_at) = entry.expires_at {
            self.expiry.schedule(key, expires_at, generation);
        }
        match (was_expiring, is_expiring) {
            (false, true) => self.expiring_entries += 1,
            (true, false) => self.expiring_entries -= 1,
            _ => {}
        }
        debug!(%key, ?ttl_ms, "ttl updated");
        self.maybe_compact();
        Ok(())
    }

    // == Sweep Expired ==
    /// Removes every entry whose TTL has elapsed, driven by the expiry heap.
    ///
    /// Returns the number of entries removed.
    pub fn sweep_expired(&mut self) -> usize {
        if self.expiry.is_empty() {
            return 0;
        }
        let now = self.clock.now_ms();
        let mut removed = 0;

        while let Some(schedule) = self.expiry.pop_due(now) {
            let current = self.entries.get(&schedule.key).is_some_and(|entry| {
                entry.generation == schedule.generation && entry.is_expired(now)
            });
            if current {
                self.remove_entry(&schedule.key, RemovalReason::Expired);
                removed += 1;
            }
        }
        self.maybe_compact();

        if removed > 0 {
            debug!(removed, "swept expired entries");
        }
        removed
    }

    // == Invalidation ==
    /// Deletes every entry carrying any of `tags`. Returns the removed keys,
    /// sorted.
    pub fn invalidate_by_tags<S: AsRef<str>>(&mut self, tags: &[S]) -> Vec<String> {
        let keys = self.tags.keys_for_tags(tags);
        let removed: Vec<String> = keys.into_iter().filter(|key| self.delete(key)).collect();
        debug!(count = removed.len(), "invalidated by tags");
        removed
    }

    pub fn invalidate_by_tag(&mut self, tag: &str) -> Vec<String> {
        self.invalidate_by_tags(&[tag])
    }

    /// Deletes every entry whose key matches `pattern`. Returns the removed
    /// keys, sorted.
    pub fn invalidate_pattern(&mut self, pattern: &KeyPattern) -> Result<Vec<String>> {
        let matcher = pattern.compile()?;
        let mut keys: Vec<String> = self
            .entries
            .keys()
            .filter(|key| matcher.is_match(key))
            .cloned()
            .collect();
        keys.sort();
        keys.retain(|key| self.delete(key));
        debug!(?pattern, count = keys.len(), "invalidated by pattern");
        Ok(keys)
    }

    // == Convenience ==
    /// Returns the cached value, or computes, stores and returns it.
    ///
    /// A supplier error propagates without touching the cache.
    pub fn get_or_set<F, E>(
        &mut self,
        key: &str,
        supplier: F,
        options: EntryOptions,
    ) -> std::result::Result<V, E>
    where
        F: FnOnce() -> std::result::Result<V, E>,
        E: From<CacheError>,
    {
        if let Some(value) = self.get(key) {
            return Ok(value);
        }
        let value = supplier()?;
        self.set_with(key, value.clone(), options)?;
        Ok(value)
    }

    /// Looks up each key with `get` semantics.
    pub fn mget<S: AsRef<str>>(&mut self, keys: &[S]) -> Vec<Option<V>> {
        keys.iter().map(|key| self.get(key.as_ref())).collect()
    }

    /// Stores each pair in order with `set` semantics.
    ///
    /// Stops at the first failure; pairs already written stay written.
    pub fn mset<I, K>(&mut self, entries: I, ttl: Option<u64>) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
    {
        for (key, value) in entries {
            self.set(key, value, ttl)?;
        }
        Ok(())
    }

    // == Introspection ==
    /// Metadata of a live entry, without touching recency.
    pub fn entry_info(&self, key: &str) -> Option<EntryInfo> {
        let now = self.clock.now_ms();
        self.entries
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.info(now))
    }

    /// Live keys from most to least recently used.
    pub fn keys(&self) -> Vec<String> {
        let now = self.clock.now_ms();
        self.lru
            .iter()
            .filter(|key| {
                self.entries
                    .get(*key)
                    .is_some_and(|entry| !entry.is_expired(now))
            })
            .map(str::to_string)
            .collect()
    }

    /// The key the next eviction would remove.
    pub fn eviction_candidate(&self) -> Option<&str> {
        self.lru.peek_oldest()
    }

    pub fn keys_for_tag(&self, tag: &str) -> Vec<String> {
        self.tags.keys_for_tag(tag)
    }

    pub fn tags(&self) -> Vec<String> {
        self.tags.tags()
    }

    /// Returns current cache metrics.
    pub fn metrics(&self) -> CacheMetrics {
        self.stats.snapshot(self.config.max_size_bytes)
    }

    /// Earliest pending expiration time (Unix ms), possibly stale.
    pub fn next_expiration(&self) -> Option<u64> {
        self.expiry.next_deadline()
    }

    /// Schedules held by the expiry heap, stale ones included.
    pub fn pending_expirations(&self) -> usize {
        self.expiry.len()
    }

    /// Returns the current number of entries, including expired entries not
    /// yet removed.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn size_bytes(&self) -> usize {
        self.stats.current_size_bytes
    }

    // == Internals ==
    fn remove_entry(&mut self, key: &str, reason: RemovalReason) -> Option<CacheEntry<V>> {
        let entry = self.entries.remove(key)?;
        if entry.expires_at.is_some() {
            self.expiring_entries -= 1;
        }
        self.lru.remove(key);
        self.tags.remove(key, &entry.tags);
        self.stats.entry_removed(entry.size_bytes);
        match reason {
            RemovalReason::Deleted => self.stats.record_delete(),
            RemovalReason::Expired => self.stats.record_expiration(),
            RemovalReason::Evicted => self.stats.record_eviction(),
            RemovalReason::Replaced => {}
        }
        self.notify(|| CacheEvent::Removed {
            key: key.to_string(),
            size_bytes: entry.size_bytes,
            reason,
        });
        Some(entry)
    }

    /// Evicts least recently used entries until `incoming` bytes fit or the
    /// store is empty.
    fn evict_for(&mut self, incoming: usize) {
        while self.stats.current_size_bytes.saturating_add(incoming) > self.config.max_size_bytes {
            let Some(victim) = self.lru.evict_oldest() else {
                break;
            };
            debug!(key = %victim, incoming, "evicting least recently used entry");
            self.remove_entry(&victim, RemovalReason::Evicted);
        }
    }

    fn maybe_compact(&mut self) {
        if !self.expiry.needs_compaction(self.expiring_entries) {
            return;
        }
        let before = self.expiry.len();
        let entries = &self.entries;
        self.expiry.retain(|schedule| {
            entries
                .get(&schedule.key)
                .is_some_and(|entry| entry.generation == schedule.generation)
        });
        debug!(before, after = self.expiry.len(), "compacted expiry queue");
    }

    fn record_miss(&mut self, key: &str) {
        self.stats.record_miss();
        self.notify(|| CacheEvent::Miss {
            key: key.to_string(),
        });
    }

    fn bump_generation(&mut self) -> u64 {
        self.next_generation += 1;
        self.next_generation
    }

    fn notify<F: FnOnce() -> CacheEvent>(&self, event: F) {
        if let Some(observer) = &self.observer {
            observer.on_event(&event());
        }
    }
}

fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(CacheError::InvalidKey("Key cannot be empty".to_string()));
    }
    if key.len() > MAX_KEY_LENGTH {
        return Err(CacheError::InvalidKey(format!(
            "Key exceeds maximum length of {} bytes",
            MAX_KEY_LENGTH
        )));
    }
    Ok(())
}

#[cfg(test)]
impl<V: CacheValue> CacheStore<V> {
    /// Checks every cross-structure invariant; panics on the first violation.
    pub(crate) fn assert_consistent(&self) {
        let total: usize = self.entries.values().map(|e| e.size_bytes).sum();
        assert_eq!(total, self.stats.current_size_bytes, "size accounting drifted");
        assert_eq!(self.entries.len(), self.stats.total_entries, "entry count drifted");
        assert_eq!(self.entries.len(), self.lru.len(), "recency list drifted");
        let expiring = self.entries.values().filter(|e| e.expires_at.is_some()).count();
        assert_eq!(expiring, self.expiring_entries, "expiring entry count drifted");

        for (key, entry) in &self.entries {
            assert!(self.lru.contains(key), "{} missing from recency list", key);
            for tag in &entry.tags {
                assert!(self.tags.contains(tag, key), "{} missing under tag {}", key, tag);
            }
            if let Some(expires_at) = entry.expires_at {
                assert!(expires_at > entry.created_at);
            }
        }
        for (tag, keys) in self.tags.iter() {
            assert!(!keys.is_empty(), "empty bucket for {}", tag);
            for key in keys {
                let entry = self.entries.get(key).expect("orphaned tag index entry");
                assert!(entry.tags.contains(tag));
            }
        }
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ManualClock;
    use std::time::Duration;

    const START_MS: u64 = 1_700_000_000_000;

    fn store_with(max_size_bytes: usize) -> (CacheStore<String>, ManualClock) {
        let clock = ManualClock::new(START_MS);
        let config = CacheConfig::default()
            .with_max_size_bytes(max_size_bytes)
            .with_default_ttl(300);
        (CacheStore::with_clock(config, Arc::new(clock.clone())), clock)
    }

    fn ten_bytes(n: usize) -> String {
        format!("value-{:04}", n)
    }

    #[test]
    fn test_store_set_and_get() {
        let (mut store, _) = store_with(1024);

        store.set("key1", "value1".to_string(), None).unwrap();
        assert_eq!(store.get("key1"), Some("value1".to_string()));
        assert_eq!(store.len(), 1);
        assert_eq!(store.size_bytes(), 6);
    }

    #[test]
    fn test_store_get_nonexistent_is_a_miss() {
        let (mut store, _) = store_with(1024);

        assert_eq!(store.get("nonexistent"), None);
        assert_eq!(store.metrics().misses, 1);
    }

    #[test]
    fn test_delete_is_idempotent() {
        let (mut store, _) = store_with(1024);
        store.set("k", "v".to_string(), None).unwrap();

        assert!(store.delete("k"));
        assert!(!store.delete("k"));
        assert_eq!(store.metrics().deletes, 1);
        assert!(store.is_empty());
        store.assert_consistent();
    }

    #[test]
    fn test_overwrite_replaces_size_and_tags() {
        let (mut store, _) = store_with(1024);

        store
            .set_with("k", "short".to_string(), EntryOptions::new().tag("old"))
            .unwrap();
        store
            .set_with("k", "much longer".to_string(), EntryOptions::new().tag("new"))
            .unwrap();

        assert_eq!(store.get("k"), Some("much longer".to_string()));
        assert_eq!(store.size_bytes(), 11);
        assert!(store.keys_for_tag("old").is_empty());
        assert_eq!(store.keys_for_tag("new"), vec!["k"]);
        assert_eq!(store.metrics().sets, 2);
        assert_eq!(store.metrics().deletes, 0);
        store.assert_consistent();
    }

    #[test]
    fn test_ttl_lazy_expiration() {
        let (mut store, clock) = store_with(1024);
        store.set("k", "v".to_string(), Some(1)).unwrap();

        clock.advance(Duration::from_millis(500));
        assert!(store.has("k"));
        assert_eq!(store.get("k"), Some("v".to_string()));

        clock.advance(Duration::from_millis(1_000));
        assert!(!store.has("k"));
        assert_eq!(store.get("k"), None);
        assert_eq!(store.metrics().expirations, 1);
        assert!(store.is_empty());
        store.assert_consistent();
    }

    #[test]
    fn test_ttl_sweep_expiration() {
        let (mut store, clock) = store_with(1024);
        store.set("short", "v".to_string(), Some(1)).unwrap();
        store.set("long", "v".to_string(), Some(10)).unwrap();

        clock.advance(Duration::from_millis(500));
        assert_eq!(store.sweep_expired(), 0);
        assert_eq!(store.len(), 2);

        clock.advance(Duration::from_millis(1_000));
        assert_eq!(store.sweep_expired(), 1);
        assert_eq!(store.keys(), vec!["long"]);
        store.assert_consistent();
    }

    #[test]
    fn test_ttl_convention() {
        let (mut store, clock) = store_with(1024);
        store.set("default", "v".to_string(), None).unwrap();
        store.set("zero", "v".to_string(), Some(0)).unwrap();
        store
            .set_with("forever", "v".to_string(), EntryOptions::new().never_expire())
            .unwrap();

        let default_info = store.entry_info("default").unwrap();
        assert_eq!(default_info.ttl_remaining_ms, Some(300_000));
        assert_eq!(store.entry_info("zero").unwrap().ttl_remaining_ms, Some(300_000));
        assert_eq!(store.entry_info("forever").unwrap().expires_at, None);

        clock.advance(Duration::from_secs(301));
        assert_eq!(store.sweep_expired(), 2);
        assert!(store.has("forever"));
    }

    #[test]
    fn test_zero_default_ttl_never_expires() {
        let clock = ManualClock::new(START_MS);
        let config = CacheConfig::default().with_default_ttl(0);
        let mut store: CacheStore<String> = CacheStore::with_clock(config, Arc::new(clock.clone()));

        store.set("k", "v".to_string(), None).unwrap();
        clock.advance(Duration::from_secs(86_400));
        assert!(store.has("k"));
        assert!(store.next_expiration().is_none());
    }

    #[test]
    fn test_lru_eviction_respects_access() {
        // Room for exactly three 10-byte values
        let (mut store, _) = store_with(30);
        for n in 1..=3 {
            store.set(format!("e{}", n), ten_bytes(n), None).unwrap();
        }

        store.get("e1").unwrap();
        assert_eq!(store.eviction_candidate(), Some("e2"));
        store.set("e4", ten_bytes(4), None).unwrap();

        assert!(store.has("e1"));
        assert!(!store.has("e2"));
        assert!(store.has("e3"));
        assert!(store.has("e4"));
        assert_eq!(store.metrics().evictions, 1);
        store.assert_consistent();
    }

    #[test]
    fn test_has_does_not_refresh_recency() {
        let (mut store, _) = store_with(20);
        store.set("a", ten_bytes(1), None).unwrap();
        store.set("b", ten_bytes(2), None).unwrap();

        assert!(store.has("a"));
        assert_eq!(store.eviction_candidate(), Some("a"));
        store.set("c", ten_bytes(3), None).unwrap();

        assert!(!store.has("a"), "peek must not protect an entry from eviction");
        assert!(store.has("b"));
        assert_eq!(store.metrics().hits, 0);
    }

    #[test]
    fn test_eviction_frees_enough_for_larger_entry() {
        let (mut store, _) = store_with(30);
        for n in 1..=3 {
            store.set(format!("e{}", n), ten_bytes(n), None).unwrap();
        }

        store.set("big", "x".repeat(25), None).unwrap();
        assert_eq!(store.keys(), vec!["big"]);
        assert_eq!(store.metrics().evictions, 3);
        assert_eq!(store.size_bytes(), 25);
    }

    #[test]
    fn test_lenient_policy_accepts_oversized_entry() {
        let (mut store, _) = store_with(30);
        store.set("small", ten_bytes(1), None).unwrap();

        store.set("huge", "x".repeat(100), None).unwrap();
        assert_eq!(store.keys(), vec!["huge"]);
        assert_eq!(store.size_bytes(), 100);
        store.assert_consistent();
    }

    #[test]
    fn test_maximal_size_hint_does_not_overflow_accounting() {
        let (mut store, _) = store_with(30);
        store
            .set_with("big", "v".to_string(), EntryOptions::new().size_hint(usize::MAX))
            .unwrap();
        assert_eq!(store.size_bytes(), usize::MAX);

        store.set("next", "next".to_string(), None).unwrap();

        assert_eq!(store.keys(), vec!["next"]);
        assert_eq!(store.size_bytes(), 4);
        assert_eq!(store.metrics().evictions, 1);
        store.assert_consistent();
    }

    #[test]
    fn test_strict_policy_rejects_oversized_entry() {
        let config = CacheConfig::default()
            .with_max_size_bytes(30)
            .with_capacity_policy(CapacityPolicy::Strict);
        let mut store: CacheStore<String> = CacheStore::new(config);
        store.set("small", ten_bytes(1), None).unwrap();

        let err = store.set("huge", "x".repeat(100), None).unwrap_err();
        assert!(matches!(err, CacheError::CapacityExceeded { size_bytes: 100, .. }));
        assert!(store.has("small"), "rejection must not evict anything");

        // Still evicts normally for entries that fit
        store.set("fits", "y".repeat(25), None).unwrap();
        assert_eq!(store.keys(), vec!["fits"]);
    }

    #[test]
    fn test_size_hint_overrides_estimate() {
        let (mut store, _) = store_with(1024);
        store
            .set_with("k", "v".to_string(), EntryOptions::new().size_hint(512))
            .unwrap();
        assert_eq!(store.size_bytes(), 512);
        assert_eq!(store.entry_info("k").unwrap().size_bytes, 512);
    }

    #[test]
    fn test_invalidate_by_tags() {
        let (mut store, _) = store_with(1024);
        store.set_with("k1", "v".to_string(), EntryOptions::new().tag("t")).unwrap();
        store.set_with("k2", "v".to_string(), EntryOptions::new().tag("t")).unwrap();
        store.set_with("k3", "v".to_string(), EntryOptions::new().tag("u")).unwrap();

        assert_eq!(store.invalidate_by_tags(&["t"]), vec!["k1", "k2"]);
        assert!(store.has("k3"));
        assert!(store.invalidate_by_tags(&["t"]).is_empty());
        assert_eq!(store.tags(), vec!["u"]);
        assert_eq!(store.metrics().deletes, 2);
        store.assert_consistent();
    }

    #[test]
    fn test_invalidate_by_overlapping_tags_reports_key_once() {
        let (mut store, _) = store_with(1024);
        store
            .set_with("k1", "v".to_string(), EntryOptions::new().tags(["t", "u"]))
            .unwrap();
        store.set_with("k2", "v".to_string(), EntryOptions::new().tag("u")).unwrap();

        assert_eq!(store.invalidate_by_tags(&["t", "u"]), vec!["k1", "k2"]);
        assert!(store.tags().is_empty());
    }

    #[test]
    fn test_invalidate_pattern_prefix() {
        let (mut store, _) = store_with(1024);
        for key in ["report-1", "report-2", "other"] {
            store.set(key, "v".to_string(), None).unwrap();
        }

        let removed = store.invalidate_pattern(&KeyPattern::prefix("report-")).unwrap();
        assert_eq!(removed, vec!["report-1", "report-2"]);
        assert_eq!(store.keys(), vec!["other"]);
    }

    #[test]
    fn test_invalidate_pattern_glob_and_regex() {
        let (mut store, _) = store_with(1024);
        for key in ["essay:1:score", "essay:22:score", "essay:3:draft"] {
            store.set(key, "v".to_string(), None).unwrap();
        }

        let removed = store.invalidate_pattern(&KeyPattern::glob("essay:?:*")).unwrap();
        assert_eq!(removed, vec!["essay:1:score", "essay:3:draft"]);

        let removed = store.invalidate_pattern(&KeyPattern::regex(r":\d{2}:")).unwrap();
        assert_eq!(removed, vec!["essay:22:score"]);
    }

    #[test]
    fn test_invalid_regex_is_reported() {
        let (mut store, _) = store_with(1024);
        store.set("k", "v".to_string(), None).unwrap();

        let result = store.invalidate_pattern(&KeyPattern::regex("[unclosed"));
        assert!(matches!(result, Err(CacheError::InvalidPattern { .. })));
        assert!(store.has("k"));
    }

    #[test]
    fn test_hit_rate() {
        let (mut store, _) = store_with(1024);
        store.set("k", "v".to_string(), None).unwrap();
        for _ in 0..3 {
            store.get("k").unwrap();
        }
        assert!(store.get("missing").is_none());

        let metrics = store.metrics();
        assert_eq!(metrics.hits, 3);
        assert_eq!(metrics.misses, 1);
        assert_eq!(metrics.hit_rate, 75.0);
    }

    #[test]
    fn test_update_ttl_replaces_schedule() {
        let (mut store, clock) = store_with(1024);
        store.set("k", "v".to_string(), Some(1)).unwrap();

        store.update_ttl("k", 10u64).unwrap();
        clock.advance(Duration::from_secs(2));

        // The original 1s schedule is due but stale
        assert_eq!(store.sweep_expired(), 0);
        assert!(store.has("k"));

        clock.advance(Duration::from_secs(9));
        assert_eq!(store.sweep_expired(), 1);
        assert!(!store.has("k"));
    }

    #[test]
    fn test_repeated_update_ttl_keeps_expiry_queue_bounded() {
        let (mut store, _) = store_with(1024);
        store.set("k", "v".to_string(), Some(60)).unwrap();

        for _ in 0..10_000 {
            store.update_ttl("k", 60u64).unwrap();
        }

        assert!(
            store.pending_expirations() <= 65,
            "expiry queue grew to {}",
            store.pending_expirations()
        );
        store.assert_consistent();
    }

    #[test]
    fn test_never_expiring_entries_do_not_shield_stale_schedules() {
        let (mut store, _) = store_with(1024 * 1024);
        for i in 0..500 {
            let options = EntryOptions::new().never_expire();
            store
                .set_with(format!("pinned-{}", i), "v".to_string(), options)
                .unwrap();
        }
        store.set("k", "v".to_string(), Some(60)).unwrap();

        for _ in 0..500 {
            store.update_ttl("k", 60u64).unwrap();
        }

        assert!(store.pending_expirations() <= 65);
        assert_eq!(store.len(), 501);
    }

    #[test]
    fn test_deletes_compact_expiry_queue() {
        let (mut store, _) = store_with(1024 * 1024);
        for i in 0..200 {
            store.set(format!("k{}", i), "v".to_string(), Some(60)).unwrap();
        }
        for i in 0..190 {
            assert!(store.delete(&format!("k{}", i)));
        }

        assert!(store.pending_expirations() <= 65);
        assert_eq!(store.sweep_expired(), 0);
        store.assert_consistent();
    }

    #[test]
    fn test_update_ttl_to_never() {
        let (mut store, clock) = store_with(1024);
        store.set("k", "v".to_string(), Some(1)).unwrap();

        store.update_ttl("k", Ttl::Never).unwrap();
        clock.advance(Duration::from_secs(5));
        assert_eq!(store.sweep_expired(), 0);
        assert!(store.has("k"));
    }

    #[test]
    fn test_update_ttl_missing_or_expired_key() {
        let (mut store, clock) = store_with(1024);
        assert!(store.update_ttl("missing", 5u64).unwrap_err().is_not_found());

        store.set("k", "v".to_string(), Some(1)).unwrap();
        clock.advance(Duration::from_secs(2));
        assert!(store.update_ttl("k", 5u64).unwrap_err().is_not_found());
        assert!(store.is_empty());
    }

    #[test]
    fn test_stale_schedule_after_reset_is_noop() {
        let (mut store, clock) = store_with(1024);
        store.set("k", "first".to_string(), Some(1)).unwrap();
        store.delete("k");
        store.set("k", "second".to_string(), Some(60)).unwrap();

        clock.advance(Duration::from_secs(2));
        assert_eq!(store.sweep_expired(), 0);
        assert_eq!(store.get("k"), Some("second".to_string()));
    }

    #[test]
    fn test_clear_keeps_cumulative_metrics() {
        let (mut store, _) = store_with(1024);
        store.set_with("k1", "v".to_string(), EntryOptions::new().tag("t")).unwrap();
        store.set("k2", "v".to_string(), Some(5)).unwrap();
        store.get("k1");

        store.clear();
        let metrics = store.metrics();
        assert_eq!(metrics.entries, 0);
        assert_eq!(metrics.current_size_bytes, 0);
        assert_eq!(metrics.hits, 1);
        assert_eq!(metrics.sets, 2);
        assert!(store.tags().is_empty());
        assert!(store.next_expiration().is_none());

        store.reset_metrics();
        assert_eq!(store.metrics().hits, 0);
        store.assert_consistent();
    }

    #[test]
    fn test_get_or_set() {
        let (mut store, _) = store_with(1024);
        let mut calls = 0;

        for _ in 0..3 {
            let value: std::result::Result<String, CacheError> = store.get_or_set(
                "k",
                || {
                    calls += 1;
                    Ok("computed".to_string())
                },
                EntryOptions::new().tag("computed"),
            );
            assert_eq!(value.unwrap(), "computed");
        }
        assert_eq!(calls, 1);
        assert_eq!(store.keys_for_tag("computed"), vec!["k"]);
    }

    #[test]
    fn test_get_or_set_supplier_error_leaves_cache_untouched() {
        let (mut store, _) = store_with(1024);

        let result: anyhow::Result<String> = store.get_or_set(
            "k",
            || Err(anyhow::anyhow!("upstream failed")),
            EntryOptions::new(),
        );
        assert_eq!(result.unwrap_err().to_string(), "upstream failed");
        assert!(store.is_empty());
        assert_eq!(store.metrics().sets, 0);
    }

    #[test]
    fn test_mget_and_mset() {
        let (mut store, _) = store_with(1024);
        store
            .mset(vec![("a", "1".to_string()), ("b", "2".to_string())], None)
            .unwrap();

        assert_eq!(
            store.mget(&["a", "missing", "b"]),
            vec![Some("1".to_string()), None, Some("2".to_string())]
        );
    }

    #[test]
    fn test_mset_keeps_entries_written_before_failure() {
        let (mut store, _) = store_with(1024);
        let result = store.mset(
            vec![
                ("a".to_string(), "1".to_string()),
                (String::new(), "2".to_string()),
                ("c".to_string(), "3".to_string()),
            ],
            None,
        );

        assert!(matches!(result, Err(CacheError::InvalidKey(_))));
        assert!(store.has("a"));
        assert!(!store.has("c"));
    }

    #[test]
    fn test_key_validation() {
        let (mut store, _) = store_with(1024);
        assert!(matches!(
            store.set("", "v".to_string(), None),
            Err(CacheError::InvalidKey(_))
        ));
        assert!(matches!(
            store.set("x".repeat(MAX_KEY_LENGTH + 1), "v".to_string(), None),
            Err(CacheError::InvalidKey(_))
        ));
    }

    #[test]
    fn test_observer_receives_lifecycle_events() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<CacheEvent>();
        let (store, _) = store_with(10);
        let mut store = store.with_observer(Arc::new(tx));

        store.set("a", ten_bytes(1), None).unwrap();
        store.get("a");
        store.get("zzz");
        store.set("b", ten_bytes(2), None).unwrap();

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        assert_eq!(
            events,
            vec![
                CacheEvent::Set { key: "a".to_string(), size_bytes: 10 },
                CacheEvent::Hit { key: "a".to_string() },
                CacheEvent::Miss { key: "zzz".to_string() },
                CacheEvent::Removed {
                    key: "a".to_string(),
                    size_bytes: 10,
                    reason: RemovalReason::Evicted,
                },
                CacheEvent::Set { key: "b".to_string(), size_bytes: 10 },
            ]
        );
    }

    #[test]
    fn test_disabled_metrics() {
        let config = CacheConfig::default().with_metrics(false);
        let mut store: CacheStore<String> = CacheStore::new(config);
        store.set("k", "v".to_string(), None).unwrap();
        store.get("k");
        store.get("missing");

        let metrics = store.metrics();
        assert_eq!(metrics.hits, 0);
        assert_eq!(metrics.misses, 0);
        assert_eq!(metrics.sets, 0);
        assert_eq!(metrics.entries, 1);
        assert_eq!(metrics.current_size_bytes, 1);
    }

    #[test]
    fn test_entry_info_does_not_touch_recency() {
        let (mut store, clock) = store_with(20);
        store.set("a", ten_bytes(1), None).unwrap();
        store.set("b", ten_bytes(2), None).unwrap();
        clock.advance(Duration::from_millis(250));
        store.get("a");

        let info = store.entry_info("a").unwrap();
        assert_eq!(info.access_count, 1);
        assert_eq!(info.last_accessed_at.timestamp_millis() as u64, START_MS + 250);

        store.entry_info("b");
        assert_eq!(store.keys(), vec!["a", "b"]);
    }

    #[test]
    fn test_expiry_queue_compacts_stale_schedules() {
        let (mut store, _) = store_with(usize::MAX);
        for round in 0..200 {
            store.set("k", format!("v{}", round), Some(60)).unwrap();
        }
        assert!(store.expiry.len() <= 130, "queue grew to {}", store.expiry.len());
        store.assert_consistent();
    }
}
