//! Counter stores for the sliding-window limiter.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use crate::error::StoreError;

/// One sliding-window update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowRequest<'a> {
    pub key: &'a str,
    pub now_ms: u64,
    pub window_ms: u64,
    /// Unique member recorded for this request; two requests in the same millisecond must
    /// not collapse into one.
    pub member: String,
}

impl WindowRequest<'_> {
    /// Timestamps at or before this instant have left the window. `None` while less than
    /// one full window has elapsed since the clock's epoch; nothing is old enough to drop.
    pub fn window_start(&self) -> Option<u64> {
        self.now_ms.checked_sub(self.window_ms)
    }

    /// Key expiry: the window rounded up to whole seconds.
    pub fn expiry_secs(&self) -> u64 {
        self.window_ms.div_ceil(1_000).max(1)
    }
}

/// The window as it stood before the current request was recorded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WindowSnapshot {
    pub count: u64,
    /// Oldest timestamp still inside the window.
    pub oldest_ms: Option<u64>,
}

/// Shared counter store.
///
/// `record` must run as one atomic batch: drop timestamps `<= window_start` (if any), count the rest,
/// read the oldest, add `member` at `now_ms`, and refresh the key's expiry. Every request is
/// recorded, admitted or not.
#[async_trait]
pub trait WindowStore: Send + Sync {
    async fn record(&self, request: WindowRequest<'_>) -> Result<WindowSnapshot, StoreError>;
}

#[async_trait]
impl<S: WindowStore + ?Sized> WindowStore for Arc<S> {
    async fn record(&self, request: WindowRequest<'_>) -> Result<WindowSnapshot, StoreError> {
        (**self).record(request).await
    }
}

#[derive(Debug, Default)]
struct Window {
    members: BTreeSet<(u64, String)>,
    expires_at_ms: u64,
}

const PURGE_EVERY: u64 = 1_024;

/// Process-local store. One instance's view only; share it by `Arc` or clone.
#[derive(Debug, Default, Clone)]
pub struct InMemoryWindowStore {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Debug, Default)]
struct Inner {
    windows: HashMap<String, Window>,
    ops: u64,
}

impl InMemoryWindowStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        self.inner.lock().windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every key whose expiry has passed.
    pub fn purge_expired(&self, now_ms: u64) -> usize {
        let mut inner = self.inner.lock();
        let before = inner.windows.len();
        inner.windows.retain(|_, w| w.expires_at_ms > now_ms);
        before - inner.windows.len()
    }
}

#[async_trait]
impl WindowStore for InMemoryWindowStore {
    async fn record(&self, request: WindowRequest<'_>) -> Result<WindowSnapshot, StoreError> {
        let mut inner = self.inner.lock();
        inner.ops = inner.ops.wrapping_add(1);
        if inner.ops % PURGE_EVERY == 0 {
            let now = request.now_ms;
            inner.windows.retain(|_, w| w.expires_at_ms > now);
        }

        let window = inner.windows.entry(request.key.to_string()).or_default();
        if window.expires_at_ms <= request.now_ms {
            window.members.clear();
        }

        if let Some(start) = request.window_start() {
            let cutoff = (start.saturating_add(1), String::new());
            window.members = window.members.split_off(&cutoff);
        }

        let snapshot = WindowSnapshot {
            count: window.members.len() as u64,
            oldest_ms: window.members.first().map(|(ts, _)| *ts),
        };

        window.expires_at_ms = request.now_ms.saturating_add(request.expiry_secs() * 1_000);
        window.members.insert((request.now_ms, request.member));
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(key: &str, now_ms: u64, n: u32) -> WindowRequest<'_> {
        WindowRequest { key, now_ms, window_ms: 60_000, member: format!("{now_ms}-{n}") }
    }

    #[tokio::test]
    async fn counts_exclude_the_current_request() {
        let store = InMemoryWindowStore::new();
        let first = store.record(req("k", 0, 0)).await.unwrap();
        assert_eq!(first, WindowSnapshot { count: 0, oldest_ms: None });

        let second = store.record(req("k", 10_000, 1)).await.unwrap();
        assert_eq!(second, WindowSnapshot { count: 1, oldest_ms: Some(0) });
    }

    #[tokio::test]
    async fn same_millisecond_requests_are_distinct() {
        let store = InMemoryWindowStore::new();
        store.record(req("k", 5, 0)).await.unwrap();
        store.record(req("k", 5, 1)).await.unwrap();
        let snap = store.record(req("k", 5, 2)).await.unwrap();
        assert_eq!(snap.count, 2);
    }

    #[tokio::test]
    async fn requests_inside_the_first_window_are_all_counted() {
        let store = InMemoryWindowStore::new();
        store.record(req("k", 0, 0)).await.unwrap();
        let snap = store.record(req("k", 0, 1)).await.unwrap();
        assert_eq!(snap, WindowSnapshot { count: 1, oldest_ms: Some(0) });

        let snap = store.record(req("k", 59_999, 2)).await.unwrap();
        assert_eq!(snap, WindowSnapshot { count: 2, oldest_ms: Some(0) });
    }

    #[test]
    fn window_start_is_none_before_one_full_window() {
        let r = WindowRequest { key: "k", now_ms: 59_999, window_ms: 60_000, member: String::new() };
        assert_eq!(r.window_start(), None);
        let r = WindowRequest { now_ms: 60_000, ..r };
        assert_eq!(r.window_start(), Some(0));
    }

    #[tokio::test]
    async fn timestamps_on_the_window_edge_are_dropped() {
        let store = InMemoryWindowStore::new();
        store.record(req("k", 0, 0)).await.unwrap();
        store.record(req("k", 1, 1)).await.unwrap();

        // window_start = 60_000 - 60_000 = 0, so the entry at 0 is gone and 1 remains.
        let snap = store.record(req("k", 60_000, 2)).await.unwrap();
        assert_eq!(snap, WindowSnapshot { count: 1, oldest_ms: Some(1) });
    }

    #[tokio::test]
    async fn keys_are_independent_and_expire() {
        let store = InMemoryWindowStore::new();
        store.record(req("a", 0, 0)).await.unwrap();
        store.record(req("b", 0, 0)).await.unwrap();
        assert_eq!(store.len(), 2);

        assert_eq!(store.purge_expired(59_999), 0);
        assert_eq!(store.purge_expired(60_000), 2);
        assert!(store.is_empty());
    }

    #[test]
    fn expiry_rounds_up_to_whole_seconds() {
        let r = WindowRequest { key: "k", now_ms: 0, window_ms: 1_500, member: String::new() };
        assert_eq!(r.expiry_secs(), 2);
        let r = WindowRequest { window_ms: 60_000, ..r };
        assert_eq!(r.expiry_secs(), 60);
    }
}
