//! Cache Module
//!
//! Provides in-memory caching with size-bounded LRU eviction, TTL
//! expiration, tag and pattern invalidation, and hit-rate metrics.

mod clock;
mod entry;
mod expiry;
mod lru;
mod observer;
mod pattern;
mod stats;
mod store;
mod tags;


// Re-export public types
pub use clock::{current_timestamp_ms, Clock, ManualClock, SystemClock};
pub use entry::{CacheEntry, CacheValue, EntryInfo, EntryOptions, Ttl};
pub use expiry::{ExpiryQueue, Schedule};
pub use lru::LruTracker;
pub use observer::{CacheEvent, CacheObserver, RemovalReason, TracingObserver};
pub use pattern::{KeyMatcher, KeyPattern};
pub use stats::{CacheMetrics, CacheStats};
pub use store::CacheStore;
pub use tags::TagIndex;

// == Public Constants ==
/// Maximum allowed key length in bytes
pub const MAX_KEY_LENGTH: usize = 1024;
