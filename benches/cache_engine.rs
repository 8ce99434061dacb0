use bulwark::{CacheConfig, CacheEngine};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Task {
    id: u64,
    title: String,
    tags: Vec<String>,
}

fn task(id: u64) -> Task {
    Task { id, title: format!("task {id}"), tags: vec!["backend".into(), "urgent".into()] }
}

fn cache_hits(c: &mut Criterion) {
    let cache = CacheEngine::new(CacheConfig::default()).unwrap();
    for id in 0..512 {
        cache.set(&format!("task:{id}"), &task(id), Some(Duration::from_secs(600))).unwrap();
    }
    let keys: Vec<String> = (0..512).map(|id| format!("task:{id}")).collect();

    let mut i = 0;
    c.bench_function("cache_get_hit", |b| {
        b.iter(|| {
            let key = &keys[i % keys.len()];
            i += 1;
            let hit: Option<Task> = cache.get(black_box(key)).unwrap();
            black_box(hit)
        })
    });
}

fn cache_set_with_eviction(c: &mut Criterion) {
    let config = CacheConfig { max_entries: 256, ..CacheConfig::default() };
    let cache = CacheEngine::new(config).unwrap();

    let mut id = 0u64;
    c.bench_function("cache_set_evicting", |b| {
        b.iter(|| {
            id += 1;
            cache.set(black_box(&format!("task:{id}")), &task(id), None).unwrap();
        })
    });
}

fn limiter_check(c: &mut Criterion) {
    use bulwark::rate_limit::{InMemoryWindowStore, RateLimitConfig, SlidingWindowLimiter, WindowLimit};

    let rt = tokio::runtime::Runtime::new().unwrap();
    let limiter = SlidingWindowLimiter::new(
        InMemoryWindowStore::new(),
        RateLimitConfig::with_default(WindowLimit::new(1_000, u32::MAX)),
    )
    .unwrap();

    let mut n = 0u64;
    c.bench_function("limiter_check_in_memory", |b| {
        b.iter(|| {
            n += 1;
            let id = format!("user:{}", n % 64);
            rt.block_on(async { black_box(limiter.check(&id, None, None).await) })
        })
    });
}

criterion_group!(benches, cache_hits, cache_set_with_eviction, limiter_check);
criterion_main!(benches);
