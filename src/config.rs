//! Configuration Module
//!
//! Cache configuration with defaults, environment loading for the binary,
//! and serde support so callers can embed it in their own configuration.

use std::env;
use std::str::FromStr;

use serde::Deserialize;

/// Default capacity bound: 50 MiB
pub const DEFAULT_MAX_SIZE_BYTES: usize = 50 * 1024 * 1024;
/// Default TTL applied when a caller omits one
pub const DEFAULT_TTL_SECONDS: u64 = 300;
/// Default sweep cadence
pub const DEFAULT_CLEANUP_INTERVAL_SECONDS: u64 = 60;

// == Capacity Policy ==
/// What `set` does when even a full eviction cannot make room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CapacityPolicy {
    /// Evict everything that can be evicted, then insert anyway.
    #[default]
    Lenient,
    /// Reject entries larger than `max_size_bytes` with `CapacityExceeded`.
    Strict,
}

impl FromStr for CapacityPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lenient" => Ok(CapacityPolicy::Lenient),
            "strict" => Ok(CapacityPolicy::Strict),
            other => Err(format!("unknown capacity policy: {}", other)),
        }
    }
}

// == Cache Config ==
/// Cache configuration parameters.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Capacity bound on the summed entry sizes
    pub max_size_bytes: usize,
    /// TTL in seconds applied when a caller omits one; 0 means no expiration
    pub default_ttl_seconds: u64,
    /// Background sweep interval in seconds
    pub cleanup_interval_seconds: u64,
    /// Whether cumulative counters (hits, misses, ...) are recorded
    pub enable_metrics: bool,
    /// Behavior when an entry cannot fit
    pub capacity_policy: CapacityPolicy,
}

impl CacheConfig {
    /// Creates a new CacheConfig by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_MAX_SIZE_BYTES` - Capacity bound (default: 50 MiB)
    /// - `CACHE_DEFAULT_TTL` - Default TTL in seconds (default: 300)
    /// - `CACHE_CLEANUP_INTERVAL` - Sweep frequency in seconds (default: 60)
    /// - `CACHE_ENABLE_METRICS` - Record counters (default: true)
    /// - `CACHE_CAPACITY_POLICY` - `lenient` or `strict` (default: lenient)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_size_bytes: env_or("CACHE_MAX_SIZE_BYTES", defaults.max_size_bytes),
            default_ttl_seconds: env_or("CACHE_DEFAULT_TTL", defaults.default_ttl_seconds),
            cleanup_interval_seconds: env_or(
                "CACHE_CLEANUP_INTERVAL",
                defaults.cleanup_interval_seconds,
            ),
            enable_metrics: env_or("CACHE_ENABLE_METRICS", defaults.enable_metrics),
            capacity_policy: env_or("CACHE_CAPACITY_POLICY", defaults.capacity_policy),
        }
    }

    /// Sets the capacity bound.
    pub fn with_max_size_bytes(mut self, max_size_bytes: usize) -> Self {
        self.max_size_bytes = max_size_bytes;
        self
    }

    /// Sets the default TTL.
    pub fn with_default_ttl(mut self, seconds: u64) -> Self {
        self.default_ttl_seconds = seconds;
        self
    }

    /// Sets the capacity policy.
    pub fn with_capacity_policy(mut self, policy: CapacityPolicy) -> Self {
        self.capacity_policy = policy;
        self
    }

    /// Toggles cumulative metrics.
    pub fn with_metrics(mut self, enabled: bool) -> Self {
        self.enable_metrics = enabled;
        self
    }
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size_bytes: DEFAULT_MAX_SIZE_BYTES,
            default_ttl_seconds: DEFAULT_TTL_SECONDS,
            cleanup_interval_seconds: DEFAULT_CLEANUP_INTERVAL_SECONDS,
            enable_metrics: true,
            capacity_policy: CapacityPolicy::Lenient,
        }
    }
}
