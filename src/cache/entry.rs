//! Cache Entry Module
//!
//! Defines individual cache entries, their TTL convention, and how values
//! report their size for capacity accounting.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

// == Cache Value ==
/// A value that can be stored in the cache.
///
/// `size_bytes` is an estimate used for capacity accounting; it is called
/// once per `set` unless the caller supplies a size hint.
pub trait CacheValue: Clone + Send + Sync + 'static {
    fn size_bytes(&self) -> usize;
}

impl CacheValue for String {
    fn size_bytes(&self) -> usize {
        self.len()
    }
}

impl CacheValue for Vec<u8> {
    fn size_bytes(&self) -> usize {
        self.len()
    }
}

impl<T: CacheValue> CacheValue for Arc<T> {
    fn size_bytes(&self) -> usize {
        (**self).size_bytes()
    }
}

impl CacheValue for serde_json::Value {
    /// Approximates the compact JSON encoding length without producing it.
    fn size_bytes(&self) -> usize {
        use serde_json::Value;
        match self {
            Value::Null => 4,
            Value::Bool(true) => 4,
            Value::Bool(false) => 5,
            Value::Number(n) => n.to_string().len(),
            Value::String(s) => s.len() + 2,
            Value::Array(items) => {
                2 + items.len().saturating_sub(1)
                    + items.iter().map(CacheValue::size_bytes).sum::<usize>()
            }
            Value::Object(map) => {
                2 + map.len().saturating_sub(1)
                    + map
                        .iter()
                        .map(|(k, v)| k.len() + 3 + v.size_bytes())
                        .sum::<usize>()
            }
        }
    }
}

// == TTL ==
/// Time-to-live requested for an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Ttl {
    /// Use the store's configured default TTL.
    #[default]
    Default,
    /// Never expire.
    Never,
    /// Expire after this many seconds; 0 is treated as `Default`.
    Seconds(u64),
}

impl Ttl {
    /// Resolves to an effective TTL in milliseconds, `None` for no expiration.
    pub fn resolve_ms(self, default_ttl_seconds: u64) -> Option<u64> {
        let seconds = match self {
            Ttl::Never => return None,
            Ttl::Default | Ttl::Seconds(0) => default_ttl_seconds,
            Ttl::Seconds(n) => n,
        };
        (seconds > 0).then(|| seconds.saturating_mul(1000))
    }
}

impl From<Option<u64>> for Ttl {
    fn from(ttl: Option<u64>) -> Self {
        match ttl {
            None | Some(0) => Ttl::Default,
            Some(n) => Ttl::Seconds(n),
        }
    }
}

impl From<u64> for Ttl {
    fn from(seconds: u64) -> Self {
        Some(seconds).into()
    }
}

// == Entry Options ==
/// Per-entry options for `set_with` and `get_or_set`.
#[derive(Debug, Clone, Default)]
pub struct EntryOptions {
    pub ttl: Ttl,
    pub tags: Vec<String>,
    /// Overrides `CacheValue::size_bytes` when set
    pub size_hint: Option<usize>,
}

impl EntryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ttl(mut self, ttl: impl Into<Ttl>) -> Self {
        self.ttl = ttl.into();
        self
    }

    pub fn never_expire(mut self) -> Self {
        self.ttl = Ttl::Never;
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn size_hint(mut self, size_bytes: usize) -> Self {
        self.size_hint = Some(size_bytes);
        self
    }
}

// == Cache Entry ==
/// Represents a single cache entry with value and metadata.
///
/// All timestamps are Unix milliseconds.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub key: String,
    pub value: V,
    pub created_at: u64,
    /// None = no expiration
    pub expires_at: Option<u64>,
    pub access_count: u64,
    pub last_accessed_at: u64,
    pub size_bytes: usize,
    pub tags: BTreeSet<String>,
    /// Identity of this entry's expiration schedule
    pub generation: u64,
}

impl<V> CacheEntry<V> {
    // == Constructor ==
    /// Creates a new entry inserted at `now`.
    ///
    /// `ttl_ms` of `None` or `Some(0)` means no expiration, keeping
    /// `expires_at > created_at` whenever it is set.
    pub fn new(
        key: String,
        value: V,
        now: u64,
        ttl_ms: Option<u64>,
        size_bytes: usize,
        tags: BTreeSet<String>,
        generation: u64,
    ) -> Self {
        Self {
            key,
            value,
            created_at: now,
            expires_at: expiry_from(now, ttl_ms),
            access_count: 0,
            last_accessed_at: now,
            size_bytes,
            tags,
            generation,
        }
    }

    // == Is Expired ==
    /// An entry is expired once `now` is past its expiration time.
    pub fn is_expired(&self, now: u64) -> bool {
        matches!(self.expires_at, Some(expires) if now > expires)
    }

    /// Returns remaining TTL in milliseconds, or None if no expiration is set.
    pub fn ttl_remaining_ms(&self, now: u64) -> Option<u64> {
        self.expires_at.map(|expires| expires.saturating_sub(now))
    }

    /// Records a successful read.
    pub fn record_access(&mut self, now: u64) {
        self.access_count += 1;
        self.last_accessed_at = now;
    }

    /// Re-arms expiration relative to `now` under a new schedule identity.
    pub fn reschedule(&mut self, now: u64, ttl_ms: Option<u64>, generation: u64) {
        self.expires_at = expiry_from(now.max(self.created_at), ttl_ms);
        self.generation = generation;
    }

    /// Read-only metadata snapshot.
    pub fn info(&self, now: u64) -> EntryInfo {
        EntryInfo {
            key: self.key.clone(),
            created_at: to_datetime(self.created_at),
            expires_at: self.expires_at.map(to_datetime),
            last_accessed_at: to_datetime(self.last_accessed_at),
            access_count: self.access_count,
            size_bytes: self.size_bytes,
            tags: self.tags.iter().cloned().collect(),
            ttl_remaining_ms: self.ttl_remaining_ms(now),
        }
    }
}

fn expiry_from(now: u64, ttl_ms: Option<u64>) -> Option<u64> {
    ttl_ms.filter(|ttl| *ttl > 0).map(|ttl| now.saturating_add(ttl))
}

fn to_datetime(ms: u64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms as i64).unwrap_or_default()
}

// == Entry Info ==
/// Metadata about a live entry, as returned by `CacheStore::entry_info`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntryInfo {
    pub key: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub last_accessed_at: DateTime<Utc>,
    pub access_count: u64,
    pub size_bytes: usize,
    pub tags: Vec<String>,
    pub ttl_remaining_ms: Option<u64>,
}
