//! The cache against a reference LRU model: same key set, same recency order, cap never exceeded.

use bulwark::{CacheConfig, CacheEngine, ManualClock};
use proptest::prelude::*;
use std::sync::Arc;

#[derive(Debug, Clone)]
enum Op {
    Set(u8, u32),
    Get(u8),
    Delete(u8),
    Has(u8),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (0u8..8, any::<u32>()).prop_map(|(k, v)| Op::Set(k, v)),
        2 => (0u8..8).prop_map(Op::Get),
        1 => (0u8..8).prop_map(Op::Delete),
        1 => (0u8..8).prop_map(Op::Has),
    ]
}

/// Least recently used first.
#[derive(Default)]
struct Model {
    order: Vec<(String, u32)>,
}

impl Model {
    fn position(&self, key: &str) -> Option<usize> {
        self.order.iter().position(|(k, _)| k == key)
    }

    fn set(&mut self, key: String, value: u32, cap: usize) {
        if let Some(i) = self.position(&key) {
            self.order.remove(i);
        } else {
            while self.order.len() >= cap {
                self.order.remove(0);
            }
        }
        self.order.push((key, value));
    }

    fn get(&mut self, key: &str) -> Option<u32> {
        let i = self.position(key)?;
        let entry = self.order.remove(i);
        let value = entry.1;
        self.order.push(entry);
        Some(value)
    }
}

proptest! {
    #[test]
    fn engine_matches_lru_model(cap in 1usize..5, ops in prop::collection::vec(op(), 1..60)) {
        let config = CacheConfig { max_entries: cap, ..CacheConfig::default() };
        let cache = CacheEngine::with_clock(config, Arc::new(ManualClock::new(0))).unwrap();
        let mut model = Model::default();

        for op in ops {
            match op {
                Op::Set(k, v) => {
                    let key = format!("k{k}");
                    cache.set(&key, &v, None).unwrap();
                    model.set(key, v, cap);
                }
                Op::Get(k) => {
                    let key = format!("k{k}");
                    let got: Option<u32> = cache.get(&key).unwrap();
                    prop_assert_eq!(got, model.get(&key));
                }
                Op::Delete(k) => {
                    let key = format!("k{k}");
                    let present = model.position(&key).map(|i| model.order.remove(i)).is_some();
                    prop_assert_eq!(cache.delete(&key).unwrap(), present);
                }
                Op::Has(k) => {
                    let key = format!("k{k}");
                    prop_assert_eq!(cache.has(&key).unwrap(), model.position(&key).is_some());
                }
            }

            prop_assert!(cache.len() <= cap);
            let expected: Vec<String> = model.order.iter().map(|(k, _)| k.clone()).collect();
            prop_assert_eq!(cache.keys_by_recency(), expected);
        }
    }
}
