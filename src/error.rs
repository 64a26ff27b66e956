//! Error types for the cache
//!
//! Provides unified error handling using thiserror. Misses are not errors:
//! lookups report them through `Option`/`bool` return values.

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for cache operations.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Key not present (or already expired) for an operation that needs it
    #[error("Key not found: {0}")]
    NotFound(String),

    /// Key rejected before touching the store
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// Regular expression (or glob translated to one) failed to compile
    #[error("Invalid pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// Entry can never fit under the strict capacity policy
    #[error("Capacity exceeded for '{key}': {size_bytes} bytes > limit of {max_size_bytes} bytes")]
    CapacityExceeded {
        key: String,
        size_bytes: usize,
        max_size_bytes: usize,
    },
}

impl CacheError {
    /// Returns true for the `NotFound` variant.
    pub fn is_not_found(&self) -> bool {
        matches!(self, CacheError::NotFound(_))
    }
}

// == Result Type Alias ==
/// Convenience Result type for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;
