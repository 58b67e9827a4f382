// =====================================================================================
// RATE LIMITER TESTS - WINDOW ACCOUNTING AND CONCURRENCY
// =====================================================================================

use std::sync::Arc;
use std::time::Duration as StdDuration;

use assert_matches::assert_matches;
use chrono::Duration;
use futures::future::join_all;

use rate_limit_cell::{
    spawn_expiry_sweep, InMemoryRateLimitStore, RateLimitConfig, RateLimitError,
    RateLimitPreset, RateLimiter, RateLimitStore,
};
use shared_utils::clock::ManualClock;
use shared_utils::test_utils::test_clock;

fn limiter_with(clock: &ManualClock) -> (RateLimiter, Arc<InMemoryRateLimitStore>) {
    let store = Arc::new(InMemoryRateLimitStore::new());
    let limiter = RateLimiter::new(store.clone(), Arc::new(clock.clone()));
    (limiter, store)
}

fn config(window_secs: i64, limit: u32) -> RateLimitConfig {
    RateLimitConfig::new(Duration::seconds(window_secs), limit).unwrap()
}

#[tokio::test]
async fn kth_call_succeeds_only_up_to_limit() {
    for limit in [1u32, 3, 5] {
        let clock = test_clock();
        let (limiter, _) = limiter_with(&clock);
        let config = config(60, limit);

        for k in 1..=(limit + 4) {
            let result = limiter.check("register:198.51.100.9", &config).await.unwrap();
            assert_eq!(result.success, k <= limit, "call {} with limit {}", k, limit);
            assert_eq!(result.limit, limit);
        }
    }
}

#[tokio::test]
async fn remaining_never_goes_negative() {
    let clock = test_clock();
    let (limiter, _) = limiter_with(&clock);
    let config = config(60, 3);

    let mut seen = Vec::new();
    for _ in 0..6 {
        seen.push(limiter.check("auth:203.0.113.1", &config).await.unwrap().remaining);
    }

    assert_eq!(seen, vec![2, 1, 0, 0, 0, 0]);
}

#[tokio::test]
async fn rejected_attempts_are_still_counted() {
    let clock = test_clock();
    let (limiter, store) = limiter_with(&clock);
    let config = config(60, 2);

    for _ in 0..5 {
        limiter.check("auth:10.1.1.1", &config).await.unwrap();
    }

    let entry = store.get("auth:10.1.1.1").await.unwrap();
    assert_eq!(entry.count, 5);
}

#[tokio::test]
async fn window_elapsing_starts_fresh_count() {
    let clock = test_clock();
    let (limiter, _) = limiter_with(&clock);
    let config = config(60, 2);

    let first = limiter.check("auth:10.0.0.5", &config).await.unwrap();
    limiter.check("auth:10.0.0.5", &config).await.unwrap();
    let blocked = limiter.check("auth:10.0.0.5", &config).await.unwrap();
    assert!(!blocked.success);
    assert_eq!(blocked.reset_time, first.reset_time);

    clock.set(first.reset_time);

    let fresh = limiter.check("auth:10.0.0.5", &config).await.unwrap();
    assert!(fresh.success);
    assert_eq!(fresh.remaining, 1);
    assert_eq!(fresh.reset_time, first.reset_time + Duration::seconds(60));
}

#[tokio::test]
async fn reset_time_is_fixed_for_the_window() {
    let clock = test_clock();
    let (limiter, _) = limiter_with(&clock);
    let config = config(60, 10);

    let first = limiter.check("api:10.0.0.6", &config).await.unwrap();
    clock.advance(Duration::seconds(45));
    let later = limiter.check("api:10.0.0.6", &config).await.unwrap();

    assert_eq!(first.reset_time, later.reset_time);
}

#[tokio::test]
async fn identifiers_are_independent() {
    let clock = test_clock();
    let (limiter, _) = limiter_with(&clock);
    let config = config(60, 1);

    assert!(limiter.check("auth:10.0.0.1", &config).await.unwrap().success);
    assert!(!limiter.check("auth:10.0.0.1", &config).await.unwrap().success);
    assert!(limiter.check("auth:10.0.0.2", &config).await.unwrap().success);
}

#[tokio::test]
async fn presets_prefix_the_identifier() {
    let clock = test_clock();
    let (limiter, store) = limiter_with(&clock);

    limiter.check_preset(RateLimitPreset::Auth, "10.0.0.1").await.unwrap();
    limiter.check_preset(RateLimitPreset::Booking, "10.0.0.1").await.unwrap();

    assert_eq!(store.get("auth:10.0.0.1").await.unwrap().count, 1);
    assert_eq!(store.get("booking:10.0.0.1").await.unwrap().count, 1);
}

#[tokio::test]
async fn invalid_config_fails_before_any_check() {
    assert_matches!(
        RateLimitConfig::new(Duration::zero(), 10),
        Err(RateLimitError::InvalidConfig(_))
    );
    assert_matches!(
        RateLimitConfig::new(Duration::seconds(10), 0),
        Err(RateLimitError::InvalidConfig(_))
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_checks_admit_exactly_one_with_limit_one() {
    for _ in 0..20 {
        let clock = test_clock();
        let (limiter, _) = limiter_with(&clock);
        let limiter = Arc::new(limiter);
        let config = config(60, 1);

        let a = {
            let limiter = limiter.clone();
            tokio::spawn(async move { limiter.check("auth:192.0.2.1", &config).await })
        };
        let b = {
            let limiter = limiter.clone();
            tokio::spawn(async move { limiter.check("auth:192.0.2.1", &config).await })
        };

        let a = a.await.unwrap().unwrap();
        let b = b.await.unwrap().unwrap();

        assert!(a.success ^ b.success, "exactly one of two concurrent calls must pass");
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_checks_lose_no_increments() {
    let clock = test_clock();
    let (limiter, store) = limiter_with(&clock);
    let limiter = Arc::new(limiter);
    let config = config(60, 25);

    let handles = (0..100).map(|_| {
        let limiter = limiter.clone();
        tokio::spawn(async move { limiter.check("api:192.0.2.50", &config).await })
    });

    let results: Vec<_> = join_all(handles)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .collect();

    let admitted = results.iter().filter(|r| r.success).count();
    assert_eq!(admitted, 25);
    assert_eq!(store.get("api:192.0.2.50").await.unwrap().count, 100);
}

#[tokio::test]
async fn sweep_removes_only_expired_windows() {
    let clock = test_clock();
    let (limiter, _) = limiter_with(&clock);

    limiter.check("short", &config(10, 5)).await.unwrap();
    limiter.check("long", &config(600, 5)).await.unwrap();
    assert_eq!(limiter.tracked_keys().await, Some(2));

    clock.advance(Duration::seconds(11));

    assert_eq!(limiter.sweep_expired().await.unwrap(), 1);
    assert_eq!(limiter.tracked_keys().await, Some(1));
}

#[tokio::test]
async fn check_treats_expired_but_unswept_entry_as_absent() {
    let clock = test_clock();
    let (limiter, store) = limiter_with(&clock);
    let config = config(10, 1);

    limiter.check("auth:10.9.9.9", &config).await.unwrap();
    clock.advance(Duration::seconds(30));

    assert!(store.get("auth:10.9.9.9").await.is_some());
    assert!(limiter.check("auth:10.9.9.9", &config).await.unwrap().success);
}

#[tokio::test]
async fn background_sweep_runs_on_interval() {
    let clock = test_clock();
    let store = Arc::new(InMemoryRateLimitStore::new());
    let limiter = Arc::new(RateLimiter::new(store.clone(), Arc::new(clock.clone())));

    limiter.check("auth:10.2.2.2", &config(1, 5)).await.unwrap();
    clock.advance(Duration::seconds(5));

    let handle = spawn_expiry_sweep(limiter.clone(), StdDuration::from_millis(20));
    tokio::time::sleep(StdDuration::from_millis(200)).await;
    handle.abort();

    assert_eq!(store.tracked_keys().await, Some(0));
}
