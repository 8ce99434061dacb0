//! The cache engine: a namespaced key/value map with per-entry TTL and LRU eviction.
//!
//! One `parking_lot::Mutex` guards the map, the LRU order and the counters together, so the
//! map's key set and the recency order can never disagree. Serialization and deserialization
//! happen outside the lock.

use super::entry::{CacheEntry, EntryInfo};
use super::lru::LruOrder;
use super::stats::{CacheStats, Counters};
use super::sweeper::SweeperHandle;
use super::CacheConfig;
use crate::clock::{Clock, MonotonicClock};
use crate::error::{CacheError, ConfigError};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Maximum key length in bytes, before namespacing.
pub const MAX_KEY_LENGTH: usize = 250;

/// In-process cache with TTL expiry and LRU eviction.
///
/// Cheap to clone; clones share the same storage. Construct one per process at the composition
/// root and hand clones to the services that need it.
///
/// ```rust
/// use bulwark::cache::{CacheConfig, CacheEngine};
///
/// let cache = CacheEngine::new(CacheConfig::default()).unwrap();
/// cache.set("task:42", &vec!["write docs", "ship"], None).unwrap();
/// let task: Option<Vec<String>> = cache.get("task:42").unwrap();
/// assert_eq!(task.unwrap().len(), 2);
/// ```
#[derive(Clone)]
pub struct CacheEngine {
    pub(super) shared: Arc<Shared>,
}

impl std::fmt::Debug for CacheEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheEngine")
            .field("config", &self.shared.config)
            .field("clock", &self.shared.clock)
            .field("size", &self.len())
            .finish()
    }
}

pub(super) struct Shared {
    pub(super) config: CacheConfig,
    clock: Arc<dyn Clock>,
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    entries: HashMap<String, CacheEntry>,
    lru: LruOrder,
    counters: Counters,
}

impl State {
    fn remove(&mut self, key: &str) -> Option<CacheEntry> {
        let entry = self.entries.remove(key)?;
        self.lru.remove(entry.lru_tick);
        debug_assert_eq!(self.entries.len(), self.lru.len());
        Some(entry)
    }

    fn evict_head(&mut self) -> Option<String> {
        let key = self.lru.pop_head()?;
        self.entries.remove(&key);
        self.counters.evictions += 1;
        Some(key)
    }
}

impl CacheEngine {
    /// Build an engine on the monotonic clock.
    pub fn new(config: CacheConfig) -> Result<Self, ConfigError> {
        Self::with_clock(config, Arc::new(MonotonicClock::default()))
    }

    /// Build an engine on an injected clock.
    pub fn with_clock(config: CacheConfig, clock: Arc<dyn Clock>) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            shared: Arc::new(Shared { config, clock, state: Mutex::new(State::default()) }),
        })
    }

    pub fn config(&self) -> &CacheConfig {
        &self.shared.config
    }

    /// Store `value` under `key` for `ttl` (or the configured default).
    ///
    /// A new key arriving at a full cache first evicts least-recently-used entries until there is
    /// room. Overwriting an existing key replaces it in place.
    pub fn set<T>(&self, key: &str, value: &T, ttl: Option<Duration>) -> Result<(), CacheError>
    where
        T: Serialize + ?Sized,
    {
        let full_key = self.namespaced(key)?;
        let ttl_ms = self.ttl_millis(ttl)?;
        let bytes = serde_json::to_vec(value)
            .map_err(|e| CacheError::Serialization(format!("key '{}': {}", key, e)))?;
        let bytes: Arc<[u8]> = Arc::from(bytes);

        let now = self.shared.clock.now_millis();
        let mut state = self.shared.state.lock();

        if let Some(existing) = state.entries.get(&full_key) {
            let old_tick = existing.lru_tick;
            let tick = state.lru.touch(old_tick).unwrap_or_else(|| state.lru.push(full_key.clone()));
            state.entries.insert(full_key, CacheEntry::new(bytes, now, ttl_ms, tick));
            return Ok(());
        }

        while state.entries.len() >= self.shared.config.max_entries {
            match state.evict_head() {
                Some(evicted) => debug!(key = %evicted, "cache evicted least recently used entry"),
                None => break,
            }
        }

        let tick = state.lru.push(full_key.clone());
        state.entries.insert(full_key, CacheEntry::new(bytes, now, ttl_ms, tick));
        debug_assert_eq!(state.entries.len(), state.lru.len());
        Ok(())
    }

    /// Fetch a fresh copy of the value under `key`.
    ///
    /// Returns `Ok(None)` for missing and expired keys; an expired entry is removed on the spot.
    pub fn get<T>(&self, key: &str) -> Result<Option<T>, CacheError>
    where
        T: DeserializeOwned,
    {
        let full_key = self.namespaced(key)?;
        let now = self.shared.clock.now_millis();

        let bytes = {
            let mut state = self.shared.state.lock();
            let live = match state.entries.get(&full_key) {
                None => None,
                Some(entry) => Some(entry.is_live(now)),
            };
            match live {
                None => {
                    state.counters.misses += 1;
                    return Ok(None);
                }
                Some(false) => {
                    state.remove(&full_key);
                    state.counters.misses += 1;
                    state.counters.expirations += 1;
                    return Ok(None);
                }
                Some(true) => {}
            }

            state.counters.hits += 1;
            let State { entries, lru, .. } = &mut *state;
            let Some(entry) = entries.get_mut(&full_key) else {
                return Ok(None);
            };
            if let Some(tick) = lru.touch(entry.lru_tick) {
                entry.lru_tick = tick;
            }
            entry.record_access(now);
            entry.value.clone()
        };

        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| CacheError::Serialization(format!("key '{}': {}", key, e)))
    }

    /// Remove `key`. Returns whether a live or expired entry was present.
    pub fn delete(&self, key: &str) -> Result<bool, CacheError> {
        let full_key = self.namespaced(key)?;
        Ok(self.shared.state.lock().remove(&full_key).is_some())
    }

    /// Whether `key` holds a live entry. Leaves recency order and counters untouched.
    pub fn has(&self, key: &str) -> Result<bool, CacheError> {
        let full_key = self.namespaced(key)?;
        let now = self.shared.clock.now_millis();
        let state = self.shared.state.lock();
        Ok(state.entries.get(&full_key).map(|e| e.is_live(now)).unwrap_or(false))
    }

    /// Drop every entry. Counters are kept.
    pub fn clear(&self) {
        let mut state = self.shared.state.lock();
        state.entries.clear();
        state.lru.clear();
    }

    /// Remove every entry whose key starts with `prefix`. Returns how many were removed.
    pub fn invalidate_prefix(&self, prefix: &str) -> Result<usize, CacheError> {
        if prefix.is_empty() {
            return Err(CacheError::Validation("prefix must not be empty".into()));
        }
        let full_prefix = format!("{}:{}", self.shared.config.namespace, prefix);
        let mut state = self.shared.state.lock();
        let doomed: Vec<String> =
            state.entries.keys().filter(|k| k.starts_with(&full_prefix)).cloned().collect();
        for key in &doomed {
            state.remove(key);
        }
        if !doomed.is_empty() {
            debug!(prefix = %prefix, removed = doomed.len(), "cache prefix invalidated");
        }
        Ok(doomed.len())
    }

    /// Read-through lookup: return the cached value, or run `loader`, cache and return its value.
    ///
    /// Loader errors are returned as-is and nothing is cached.
    pub async fn get_or_insert_with<T, E, F, Fut>(
        &self,
        key: &str,
        ttl: Option<Duration>,
        loader: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        E: From<CacheError>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(hit) = self.get(key)? {
            return Ok(hit);
        }
        let value = loader().await?;
        self.set(key, &value, ttl)?;
        Ok(value)
    }

    /// Metadata for `key` without counting a hit or changing recency.
    pub fn entry_info(&self, key: &str) -> Result<Option<EntryInfo>, CacheError> {
        let full_key = self.namespaced(key)?;
        let now = self.shared.clock.now_millis();
        let state = self.shared.state.lock();
        Ok(state.entries.get(&full_key).filter(|e| e.is_live(now)).map(CacheEntry::info))
    }

    /// Physically remove every expired entry. This is the background sweep's body.
    pub fn purge_expired(&self) -> usize {
        self.shared.purge_expired()
    }

    /// Start the periodic background sweep on the current tokio runtime.
    pub fn spawn_sweeper(&self) -> SweeperHandle {
        SweeperHandle::spawn(Arc::downgrade(&self.shared), self.shared.config.cleanup_interval())
    }

    pub fn stats(&self) -> CacheStats {
        let now = self.shared.clock.now_millis();
        let state = self.shared.state.lock();
        let oldest = state
            .entries
            .values()
            .map(|e| e.created_at)
            .min()
            .map(|created| Duration::from_millis(now.saturating_sub(created)));
        let memory = state.entries.values().map(CacheEntry::size).sum();
        CacheStats::from_counters(&state.counters, state.entries.len(), oldest, memory)
    }

    /// Entries physically present, expired-but-unswept included.
    pub fn len(&self) -> usize {
        self.shared.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Caller keys (namespace stripped) from least to most recently used.
    pub fn keys_by_recency(&self) -> Vec<String> {
        let prefix_len = self.shared.config.namespace.len() + 1;
        let state = self.shared.state.lock();
        state.lru.iter().map(|k| k[prefix_len..].to_string()).collect()
    }

    fn namespaced(&self, key: &str) -> Result<String, CacheError> {
        if key.is_empty() {
            return Err(CacheError::Validation("key must not be empty".into()));
        }
        if key.len() > MAX_KEY_LENGTH {
            return Err(CacheError::Validation(format!(
                "key exceeds maximum length of {} bytes",
                MAX_KEY_LENGTH
            )));
        }
        Ok(format!("{}:{}", self.shared.config.namespace, key))
    }

    fn ttl_millis(&self, ttl: Option<Duration>) -> Result<u64, CacheError> {
        let ttl = ttl.unwrap_or_else(|| self.shared.config.default_ttl());
        let millis = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
        if millis == 0 {
            return Err(CacheError::Validation("ttl must be at least one millisecond".into()));
        }
        Ok(millis)
    }
}

impl Shared {
    pub(super) fn purge_expired(&self) -> usize {
        let now = self.clock.now_millis();
        let mut state = self.state.lock();
        let expired: Vec<String> = state
            .entries
            .iter()
            .filter(|(_, entry)| !entry.is_live(now))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            state.remove(key);
        }
        state.counters.expirations += expired.len() as u64;
        expired.len()
    }
}
