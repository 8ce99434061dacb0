use bulwark::rate_limit::{RateLimitConfig, SlidingWindowLimiter, WindowLimit, WindowRequest, WindowStore};
use bulwark_redis::RedisWindowStore;

// Requires Redis running. If BULWARK_TEST_REDIS_URL is unset, the tests skip.
fn redis_url() -> Option<String> {
    match std::env::var("BULWARK_TEST_REDIS_URL") {
        Ok(v) => Some(v),
        Err(_) => {
            eprintln!("skipping: set BULWARK_TEST_REDIS_URL (e.g. redis://127.0.0.1:6379/0)");
            None
        }
    }
}

#[tokio::test]
async fn pipeline_trims_counts_and_reports_oldest() {
    let Some(url) = redis_url() else { return };
    let store = RedisWindowStore::connect(&url)
        .await
        .unwrap_or_else(|e| panic!("Failed to connect to redis at '{}': {}", url, e));

    let key = format!("bulwark-test:{}", uuid::Uuid::new_v4());
    let request = |now_ms: u64| WindowRequest {
        key: &key,
        now_ms,
        window_ms: 60_000,
        member: format!("{now_ms}-{}", uuid::Uuid::new_v4()),
    };

    let first = store.record(request(1_000)).await.unwrap();
    assert_eq!(first.count, 0);
    assert_eq!(first.oldest_ms, None);

    store.record(request(2_000)).await.unwrap();
    let third = store.record(request(3_000)).await.unwrap();
    assert_eq!(third.count, 2);
    assert_eq!(third.oldest_ms, Some(1_000));

    // 61_000 - 60_000 = 1_000: the first entry leaves the window.
    let later = store.record(request(61_000)).await.unwrap();
    assert_eq!(later.count, 2);
    assert_eq!(later.oldest_ms, Some(2_000));
}

#[tokio::test]
async fn requests_at_time_zero_stay_in_the_window() {
    let Some(url) = redis_url() else { return };
    let store = RedisWindowStore::connect(&url).await.expect("connect");

    let key = format!("bulwark-test:{}", uuid::Uuid::new_v4());
    let request = |n: u32| WindowRequest { key: &key, now_ms: 0, window_ms: 60_000, member: format!("0-{n}") };

    store.record(request(0)).await.unwrap();
    let second = store.record(request(1)).await.unwrap();
    assert_eq!(second.count, 1);
    assert_eq!(second.oldest_ms, Some(0));
}

#[tokio::test]
async fn limiter_enforces_limit_across_clones() {
    let Some(url) = redis_url() else { return };
    let store = RedisWindowStore::connect(&url).await.expect("connect");

    let config = RateLimitConfig::with_default(WindowLimit::new(60_000, 3));
    let a = SlidingWindowLimiter::new(store.clone(), config.clone()).expect("valid config");
    let b = SlidingWindowLimiter::new(store, config).expect("valid config");

    let id = format!("user:{}", uuid::Uuid::new_v4());
    assert!(a.try_check(&id, None, None).await.unwrap().allowed);
    assert!(b.try_check(&id, None, None).await.unwrap().allowed);
    assert!(a.try_check(&id, None, None).await.unwrap().allowed);
    let rejected = b.try_check(&id, None, None).await.unwrap();
    assert!(!rejected.allowed);
    assert!(rejected.retry_after_secs > 0 && rejected.retry_after_secs <= 60);
}
