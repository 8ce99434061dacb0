//! Background sweep of expired cache entries.
//!
//! Entries that are written once and never read again would otherwise sit in the map until
//! LRU pressure pushes them out. The sweep holds only a weak reference to the engine and ends
//! on its own once the last engine clone is dropped.

use super::engine::Shared;
use std::sync::Weak;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

/// Handle to a running sweep. Dropping it stops the task.
#[derive(Debug)]
pub struct SweeperHandle {
    task: JoinHandle<()>,
}

impl SweeperHandle {
    pub(super) fn spawn(shared: Weak<Shared>, period: Duration) -> Self {
        let task = tokio::spawn(async move {
            info!(interval_ms = period.as_millis() as u64, "starting cache sweeper");
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let Some(shared) = shared.upgrade() else {
                    debug!("cache dropped; sweeper exiting");
                    break;
                };
                let removed = shared.purge_expired();
                drop(shared);

                if removed > 0 {
                    info!(removed, "cache sweep removed expired entries");
                } else {
                    debug!("cache sweep found no expired entries");
                }
            }
        });
        Self { task }
    }

    /// Stop the sweep.
    pub fn shutdown(self) {
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use crate::cache::{CacheConfig, CacheEngine};
    use crate::clock::ManualClock;
    use std::sync::Arc;
    use std::time::Duration;

    fn engine(clock: &ManualClock) -> CacheEngine {
        let config = CacheConfig { cleanup_interval_ms: 1_000, ..CacheConfig::default() };
        CacheEngine::with_clock(config, Arc::new(clock.clone())).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_removes_expired_entries_on_interval() {
        let clock = ManualClock::new(0);
        let cache = engine(&clock);
        let _sweeper = cache.spawn_sweeper();

        cache.set("once", &1, Some(Duration::from_millis(500))).unwrap();
        cache.set("kept", &2, Some(Duration::from_secs(60))).unwrap();
        clock.advance(Duration::from_secs(1));

        tokio::time::sleep(Duration::from_millis(1_100)).await;

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.stats().expiration_count, 1);
        assert!(cache.has("kept").unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_stops_sweeping() {
        let clock = ManualClock::new(0);
        let cache = engine(&clock);
        let sweeper = cache.spawn_sweeper();
        sweeper.shutdown();

        cache.set("once", &1, Some(Duration::from_millis(10))).unwrap();
        clock.advance(Duration::from_secs(1));
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert_eq!(cache.len(), 1, "expired entry stays until someone reads or sweeps");
    }

    #[tokio::test(start_paused = true)]
    async fn sweeper_exits_when_engine_dropped() {
        let clock = ManualClock::new(0);
        let cache = engine(&clock);
        let sweeper = cache.spawn_sweeper();
        drop(cache);

        tokio::time::sleep(Duration::from_millis(1_100)).await;
        tokio::task::yield_now().await;
        assert!(sweeper.is_finished());
    }
}
