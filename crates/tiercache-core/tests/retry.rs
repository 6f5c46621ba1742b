//! Integration tests for the retry decorator.
//!
//! Timing-sensitive tests run on tokio's paused clock, so backoff sleeps
//! complete instantly while elapsed-time budgets still advance.

mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::MockCache;
use tiercache_core::{
    BackoffPolicy, Cache, CacheContext, CacheError, Operation, RetryCache, RetryConfig, RetryEvent,
};

#[derive(Debug, Clone, PartialEq)]
struct Notification {
    operation: Operation,
    attempt: u32,
    error: String,
    backoff: Duration,
}

fn recording_retry(
    inner: Arc<MockCache>,
    config: RetryConfig,
) -> (RetryCache<Arc<MockCache>>, Arc<Mutex<Vec<Notification>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let cache = RetryCache::new(inner, config).with_notify(move |event: &RetryEvent<'_>| {
        sink.lock().unwrap().push(Notification {
            operation: event.operation,
            attempt: event.attempt,
            error: event.error.to_string(),
            backoff: event.backoff,
        });
    });
    (cache, seen)
}

#[tokio::test(start_paused = true)]
async fn test_recovers_after_transient_failures() {
    let inner = Arc::new(MockCache::new("flaky").with_entry("k", "v").failing_gets(2));
    let config = RetryConfig::new(BackoffPolicy::for_testing().with_max_retries(3));
    let (cache, seen) = recording_retry(Arc::clone(&inner), config);

    let value: String = cache.get(&CacheContext::new(), "k").await.unwrap();

    assert_eq!(value, "v");
    assert_eq!(inner.get_calls(), 3);
    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 2);
    assert_eq!(
        seen[0],
        Notification {
            operation: Operation::Get,
            attempt: 1,
            error: "flaky error: injected get failure 1".into(),
            backoff: Duration::from_millis(10),
        }
    );
    assert_eq!(seen[1].attempt, 2);
    assert_eq!(seen[1].backoff, Duration::from_millis(20));
}

#[tokio::test(start_paused = true)]
async fn test_miss_is_never_retried() {
    let inner = Arc::new(MockCache::new("empty"));
    let (cache, seen) = recording_retry(Arc::clone(&inner), RetryConfig::for_testing());

    let err = Cache::<String>::get(&cache, &CacheContext::new(), "absent")
        .await
        .unwrap_err();

    assert!(err.is_miss());
    assert_eq!(inner.get_calls(), 1);
    assert!(seen.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_already_exists_is_never_retried() {
    let inner = Arc::new(
        MockCache::new("strict").with_get_error(|key| CacheError::already_exists(key)),
    );
    let (cache, seen) = recording_retry(Arc::clone(&inner), RetryConfig::for_testing());

    let err = Cache::<String>::get(&cache, &CacheContext::new(), "k")
        .await
        .unwrap_err();

    assert!(err.is_already_exists());
    assert_eq!(inner.get_calls(), 1);
    assert!(seen.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_returns_last_error_when_retries_exhausted() {
    let inner = Arc::new(MockCache::new("down").failing_gets(usize::MAX));
    let config = RetryConfig::new(BackoffPolicy::for_testing().with_max_retries(3));
    let (cache, seen) = recording_retry(Arc::clone(&inner), config);

    let err = Cache::<String>::get(&cache, &CacheContext::new(), "k")
        .await
        .unwrap_err();

    // One initial attempt plus three retries; the error is the inner one, unwrapped.
    assert_eq!(inner.get_calls(), 4);
    assert_eq!(seen.lock().unwrap().len(), 3);
    match err {
        CacheError::Backend {
            backend, message, ..
        } => {
            assert_eq!(backend, "down");
            assert_eq!(message, "injected get failure 4");
        }
        other => panic!("expected backend error, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_stops_at_elapsed_time_budget() {
    let inner = Arc::new(MockCache::new("down").failing_gets(usize::MAX));
    let policy = BackoffPolicy::for_testing()
        .with_initial_interval(Duration::from_millis(100))
        .with_max_interval(Duration::from_secs(10))
        .with_max_retries(10)
        .with_max_elapsed_time(Some(Duration::from_millis(350)));
    let (cache, seen) = recording_retry(Arc::clone(&inner), RetryConfig::new(policy));

    let started = tokio::time::Instant::now();
    let err = Cache::<String>::get(&cache, &CacheContext::new(), "k")
        .await
        .unwrap_err();

    // Delays of 100ms and 200ms fit the budget; the next 400ms delay does not.
    assert_eq!(inner.get_calls(), 3);
    assert_eq!(seen.lock().unwrap().len(), 2);
    assert_eq!(started.elapsed(), Duration::from_millis(300));
    assert!(matches!(err, CacheError::Backend { .. }));
    assert_eq!(err.to_string(), "down error: injected get failure 3");
}

#[tokio::test(start_paused = true)]
async fn test_attempt_timeout_is_retried() {
    let inner = Arc::new(
        MockCache::new("slow")
            .with_entry("k", "v")
            .with_get_delay(Duration::from_secs(1)),
    );
    let config = RetryConfig::new(BackoffPolicy::for_testing().with_max_retries(2))
        .with_attempt_timeout(Some(Duration::from_millis(100)));
    let (cache, seen) = recording_retry(Arc::clone(&inner), config);

    let err = Cache::<String>::get(&cache, &CacheContext::new(), "k")
        .await
        .unwrap_err();

    assert!(matches!(err, CacheError::DeadlineExceeded));
    assert_eq!(inner.get_calls(), 3);
    assert_eq!(seen.lock().unwrap()[0].error, "deadline exceeded");
}

#[tokio::test(start_paused = true)]
async fn test_parent_cancellation_interrupts_backoff() {
    let inner = Arc::new(MockCache::new("down").failing_gets(usize::MAX));
    let policy = BackoffPolicy::for_testing()
        .with_initial_interval(Duration::from_secs(60))
        .with_max_interval(Duration::from_secs(60))
        .with_max_elapsed_time(None);
    let cache = Arc::new(RetryCache::new(Arc::clone(&inner), RetryConfig::new(policy)));

    let ctx = CacheContext::new();
    let op_ctx = ctx.clone();
    let op_cache = Arc::clone(&cache);
    let handle =
        tokio::spawn(async move { Cache::<String>::get(&*op_cache, &op_ctx, "k").await });

    tokio::time::sleep(Duration::from_millis(10)).await;
    ctx.cancel();

    let err = handle.await.unwrap().unwrap_err();
    assert!(matches!(err, CacheError::Cancelled));
    assert_eq!(inner.get_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_parent_deadline_bounds_retries() {
    let inner = Arc::new(MockCache::new("down").failing_gets(usize::MAX));
    let policy = BackoffPolicy::for_testing()
        .with_initial_interval(Duration::from_millis(100))
        .with_multiplier(1.0)
        .with_max_retries(100)
        .with_max_elapsed_time(None);
    let cache = RetryCache::new(Arc::clone(&inner), RetryConfig::new(policy));

    let ctx = CacheContext::new().with_timeout(Duration::from_millis(250));
    let err = Cache::<String>::get(&cache, &ctx, "k").await.unwrap_err();

    assert!(matches!(err, CacheError::DeadlineExceeded));
    // Attempts at 0ms, 100ms and 200ms; the sleep towards 300ms hits the deadline.
    assert_eq!(inner.get_calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_set_is_retried() {
    let inner = Arc::new(MockCache::new("flaky").failing_sets(1));
    let (cache, seen) = recording_retry(Arc::clone(&inner), RetryConfig::for_testing());

    cache
        .set(&CacheContext::new(), "k", &"v".to_string())
        .await
        .unwrap();

    assert_eq!(inner.set_calls(), 2);
    assert_eq!(inner.peek("k").as_deref(), Some("v"));
    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].operation, Operation::Set);
}

#[tokio::test(start_paused = true)]
async fn test_unvalidated_jitter_factor_still_retries() {
    let inner = Arc::new(MockCache::new("flaky").with_entry("k", "v").failing_gets(1));
    let config = RetryConfig::new(BackoffPolicy::for_testing().with_randomization_factor(f64::NAN));
    let (cache, seen) = recording_retry(Arc::clone(&inner), config);

    let value: String = cache.get(&CacheContext::new(), "k").await.unwrap();

    assert_eq!(value, "v");
    assert_eq!(seen.lock().unwrap()[0].backoff, Duration::from_millis(10));
}

#[tokio::test]
async fn test_ping_and_name_delegate_to_inner() {
    let inner = Arc::new(MockCache::new("backend").failing_ping("down"));
    let cache = RetryCache::new(Arc::clone(&inner), RetryConfig::for_testing());

    assert_eq!(Cache::<String>::name(&cache), "backend");
    assert!(Cache::<String>::ping(&cache).await.is_err());
    assert_eq!(inner.ping_calls(), 1);
}
