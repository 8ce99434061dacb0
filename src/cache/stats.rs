//! Cache counters and the stats snapshot returned to callers.

use serde::Serialize;
use std::time::Duration;

/// Monotonic counters kept under the engine lock.
#[derive(Debug, Default, Clone)]
pub(crate) struct Counters {
    pub(crate) hits: u64,
    pub(crate) misses: u64,
    pub(crate) evictions: u64,
    pub(crate) expirations: u64,
}

/// Point-in-time view of the cache.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStats {
    /// Entries physically present (may include expired entries not yet swept).
    pub size: usize,
    pub hit_count: u64,
    pub miss_count: u64,
    /// Entries removed by LRU pressure.
    pub eviction_count: u64,
    /// Entries removed because their TTL elapsed (lazy removal or sweep).
    pub expiration_count: u64,
    /// `hits / (hits + misses)`, `0.0` before any lookup.
    pub hit_rate: f64,
    /// Age of the oldest entry still present.
    pub oldest_entry_age: Option<Duration>,
    /// Sum of serialized entry sizes.
    pub memory_bytes: usize,
}

impl CacheStats {
    pub(crate) fn from_counters(
        counters: &Counters,
        size: usize,
        oldest_entry_age: Option<Duration>,
        memory_bytes: usize,
    ) -> Self {
        let lookups = counters.hits + counters.misses;
        let hit_rate = if lookups == 0 { 0.0 } else { counters.hits as f64 / lookups as f64 };
        Self {
            size,
            hit_count: counters.hits,
            miss_count: counters.misses,
            eviction_count: counters.evictions,
            expiration_count: counters.expirations,
            hit_rate,
            oldest_entry_age,
            memory_bytes,
        }
    }
}
