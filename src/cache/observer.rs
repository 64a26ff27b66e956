//! Cache Observer Module
//!
//! Lifecycle notifications for owners that want to watch the cache.

use std::fmt;

use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

// == Removal Reason ==
/// Why an entry left the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RemovalReason {
    /// Explicit delete, tag invalidation or pattern invalidation
    Deleted,
    /// Overwritten by a `set` on the same key
    Replaced,
    /// TTL elapsed
    Expired,
    /// LRU eviction to make room
    Evicted,
}

impl fmt::Display for RemovalReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RemovalReason::Deleted => "deleted",
            RemovalReason::Replaced => "replaced",
            RemovalReason::Expired => "expired",
            RemovalReason::Evicted => "evicted",
        };
        f.write_str(name)
    }
}

// == Cache Event ==
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CacheEvent {
    Set { key: String, size_bytes: usize },
    Hit { key: String },
    Miss { key: String },
    Removed { key: String, size_bytes: usize, reason: RemovalReason },
    Cleared { entries: usize },
}

// == Observer Trait ==
/// Receives cache lifecycle events synchronously, under the cache's lock.
///
/// Implementations must not call back into the cache.
pub trait CacheObserver: Send + Sync {
    fn on_event(&self, event: &CacheEvent);
}

/// Forwards events to a channel the owner reads from. A closed receiver
/// drops events silently.
impl CacheObserver for UnboundedSender<CacheEvent> {
    fn on_event(&self, event: &CacheEvent) {
        let _ = self.send(event.clone());
    }
}

// == Tracing Observer ==
/// Logs every event at debug level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl CacheObserver for TracingObserver {
    fn on_event(&self, event: &CacheEvent) {
        match event {
            CacheEvent::Set { key, size_bytes } => debug!(%key, size_bytes, "cache set"),
            CacheEvent::Hit { key } => debug!(%key, "cache hit"),
            CacheEvent::Miss { key } => debug!(%key, "cache miss"),
            CacheEvent::Removed {
                key,
                size_bytes,
                reason,
            } => debug!(%key, size_bytes, %reason, "cache entry removed"),
            CacheEvent::Cleared { entries } => debug!(entries, "cache cleared"),
        }
    }
}
