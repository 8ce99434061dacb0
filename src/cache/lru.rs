//! Recency order for LRU eviction.
//!
//! Every key holds a unique, strictly increasing tick. The smallest tick is the head (least
//! recently used); touching a key gives it a fresh tick at the tail. Ticks never repeat, so
//! there are no ties to break.

use std::collections::BTreeMap;

#[derive(Debug, Default)]
pub(crate) struct LruOrder {
    next_tick: u64,
    order: BTreeMap<u64, String>,
}

impl LruOrder {
    /// Append a key at the tail and return its tick.
    pub(crate) fn push(&mut self, key: String) -> u64 {
        let tick = self.next_tick;
        self.next_tick += 1;
        self.order.insert(tick, key);
        tick
    }

    /// Move the key holding `tick` to the tail. Returns the new tick.
    pub(crate) fn touch(&mut self, tick: u64) -> Option<u64> {
        let key = self.order.remove(&tick)?;
        Some(self.push(key))
    }

    pub(crate) fn remove(&mut self, tick: u64) -> Option<String> {
        self.order.remove(&tick)
    }

    /// Remove and return the least recently used key.
    pub(crate) fn pop_head(&mut self) -> Option<String> {
        self.order.pop_first().map(|(_, key)| key)
    }

    pub(crate) fn len(&self) -> usize {
        self.order.len()
    }

    pub(crate) fn clear(&mut self) {
        self.order.clear();
    }

    /// Keys from least to most recently used.
    pub(crate) fn iter(&self) -> impl Iterator<Item = &str> {
        self.order.values().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_order_is_eviction_order() {
        let mut lru = LruOrder::default();
        lru.push("a".into());
        lru.push("b".into());
        lru.push("c".into());
        assert_eq!(lru.pop_head().as_deref(), Some("a"));
        assert_eq!(lru.pop_head().as_deref(), Some("b"));
        assert_eq!(lru.pop_head().as_deref(), Some("c"));
        assert_eq!(lru.pop_head(), None);
    }

    #[test]
    fn touch_moves_key_to_tail() {
        let mut lru = LruOrder::default();
        let a = lru.push("a".into());
        lru.push("b".into());
        lru.push("c".into());

        let a = lru.touch(a).unwrap();
        assert_eq!(lru.iter().next(), Some("b"));
        assert_eq!(lru.iter().collect::<Vec<_>>(), vec!["b", "c", "a"]);

        // A stale tick no longer refers to anything.
        assert_eq!(lru.touch(0), None);
        assert!(lru.remove(a).is_some());
        assert_eq!(lru.len(), 2);
    }

    #[test]
    fn clear_empties_but_ticks_keep_increasing() {
        let mut lru = LruOrder::default();
        let first = lru.push("a".into());
        lru.clear();
        let second = lru.push("a".into());
        assert!(second > first);
        assert_eq!(lru.len(), 1);
    }
}
