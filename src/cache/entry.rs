//! A single cached value with its timing metadata.

use serde::Serialize;
use std::sync::Arc;

/// Stored entry. `value` holds the serialized bytes; readers deserialize their own copy, so no
/// caller ever shares memory with the cache.
#[derive(Debug, Clone)]
pub(crate) struct CacheEntry {
    pub(crate) value: Arc<[u8]>,
    pub(crate) created_at: u64,
    pub(crate) expires_at: u64,
    pub(crate) last_accessed_at: u64,
    pub(crate) access_count: u64,
    /// Position in the LRU order; see [`super::lru::LruOrder`].
    pub(crate) lru_tick: u64,
}

impl CacheEntry {
    pub(crate) fn new(value: Arc<[u8]>, now: u64, ttl_ms: u64, lru_tick: u64) -> Self {
        Self {
            value,
            created_at: now,
            expires_at: now.saturating_add(ttl_ms),
            last_accessed_at: now,
            access_count: 0,
            lru_tick,
        }
    }

    /// Visible only while `now < expires_at`.
    pub(crate) fn is_live(&self, now: u64) -> bool {
        now < self.expires_at
    }

    pub(crate) fn size(&self) -> usize {
        self.value.len()
    }

    pub(crate) fn record_access(&mut self, now: u64) {
        self.last_accessed_at = now;
        self.access_count = self.access_count.saturating_add(1);
    }

    pub(crate) fn info(&self) -> EntryInfo {
        EntryInfo {
            created_at_ms: self.created_at,
            expires_at_ms: self.expires_at,
            last_accessed_at_ms: self.last_accessed_at,
            access_count: self.access_count,
            size_bytes: self.size(),
        }
    }
}

/// Diagnostic snapshot of an entry's metadata. Timestamps are in the engine clock's millis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryInfo {
    pub created_at_ms: u64,
    pub expires_at_ms: u64,
    pub last_accessed_at_ms: u64,
    pub access_count: u64,
    pub size_bytes: usize,
}
