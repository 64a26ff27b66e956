//! Smart Cache - An in-process cache for memoizing expensive results
//!
//! Provides size-bounded LRU eviction, per-entry TTL expiration, tag and
//! pattern invalidation, and hit-rate metrics.

pub mod cache;
pub mod config;
pub mod error;
pub mod shared;
pub mod tasks;

pub use cache::{
    CacheEvent, CacheMetrics, CacheObserver, CacheStore, CacheValue, EntryOptions, KeyPattern,
    RemovalReason, TracingObserver, Ttl,
};
pub use config::{CacheConfig, CapacityPolicy};
pub use error::{CacheError, Result};
pub use shared::SharedCache;
pub use tasks::spawn_sweeper;
