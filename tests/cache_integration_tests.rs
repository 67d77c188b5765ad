//! Integration Tests for the Cache
//!
//! Exercises the public API end to end over in-memory storage: concurrent
//! access, refresh dispatch, the janitor and shutdown.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use refresh_cache::{Cache, CacheError, Config, Expiration, MemoryStorage, StorageKind, Value};
use serde_json::json;
use tracing_subscriber::EnvFilter;

// == Helper Functions ==

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn memory_cache(refresh_workers: usize) -> Cache {
    init_tracing();
    Cache::new(None, None, refresh_workers, Arc::new(MemoryStorage::new())).unwrap()
}

/// Registers a callback that counts invocations and sleeps for `delay`.
async fn count_refreshes(cache: &Cache, delay: Duration) -> Arc<AtomicUsize> {
    let counter = Arc::new(AtomicUsize::new(0));
    let seen = counter.clone();
    cache
        .on_refresh_needed(move |_key| {
            let seen = seen.clone();
            async move {
                seen.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(delay).await;
                Ok(())
            }
        })
        .await;
    counter
}

// == Concurrency ==

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_readers_never_see_partial_writes() {
    let cache = memory_cache(0);
    cache
        .set("pair", json!({"a": 0, "b": 0}), Expiration::Never, None)
        .await
        .unwrap();

    let writer = {
        let cache = cache.clone();
        tokio::spawn(async move {
            for i in 1..=200 {
                cache
                    .set("pair", json!({"a": i, "b": i}), Expiration::Never, None)
                    .await
                    .unwrap();
            }
        })
    };

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let cache = cache.clone();
            tokio::spawn(async move {
                for _ in 0..200 {
                    let value = cache.get("pair").await.unwrap().unwrap();
                    let Value::Json(pair) = value else {
                        panic!("unexpected value {:?}", value);
                    };
                    assert_eq!(pair["a"], pair["b"]);
                }
            })
        })
        .collect();

    writer.await.unwrap();
    for reader in readers {
        reader.await.unwrap();
    }
    assert_eq!(
        cache.get("pair").await.unwrap(),
        Some(Value::Json(json!({"a": 200, "b": 200})))
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_increments_are_not_lost() {
    let cache = memory_cache(0);
    cache.set("counter", 0i64, Expiration::Never, None).await.unwrap();

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let cache = cache.clone();
            tokio::spawn(async move {
                for _ in 0..50 {
                    cache.increment("counter", 1).await.unwrap();
                }
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap();
    }

    assert_eq!(cache.get("counter").await.unwrap(), Some(Value::I64(400)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_add_has_one_winner() {
    let cache = memory_cache(0);
    let tasks: Vec<_> = (0..8)
        .map(|i| {
            let cache = cache.clone();
            tokio::spawn(async move { cache.add("slot", i, Expiration::Never, None).await })
        })
        .collect();

    let mut winners = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(()) => winners += 1,
            Err(CacheError::AlreadyExists(_)) => {}
            Err(err) => panic!("unexpected error {}", err),
        }
    }
    assert_eq!(winners, 1);
}

// == Refresh ==

#[tokio::test]
async fn test_stale_read_returns_value_and_refreshes_once() {
    let cache = memory_cache(2);
    let counter = count_refreshes(&cache, Duration::from_millis(50)).await;

    cache
        .set("key", "stale", Expiration::Never, Some(Duration::from_millis(1)))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;

    let (first, second) = tokio::join!(cache.get("key"), cache.get("key"));
    assert_eq!(first.unwrap(), Some(Value::from("stale")));
    assert_eq!(second.unwrap(), Some(Value::from("stale")));
    assert_eq!(cache.refresh_pending().await, 1);

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(counter.load(Ordering::SeqCst), 1);
    assert_eq!(cache.refresh_pending().await, 0);
}

#[tokio::test]
async fn test_fresh_read_does_not_refresh() {
    let cache = memory_cache(1);
    let counter = count_refreshes(&cache, Duration::ZERO).await;

    cache
        .set("key", 1i32, Expiration::Never, Some(Duration::from_secs(60)))
        .await
        .unwrap();
    cache.get("key").await.unwrap();
    cache.set("plain", 2i32, Expiration::Never, None).await.unwrap();
    cache.get("plain").await.unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(counter.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_refresh_callback_writes_back() {
    let cache = memory_cache(1);
    let weak = cache.downgrade();
    cache
        .on_refresh_needed(move |key| {
            let weak = weak.clone();
            async move {
                let Some(cache) = weak.upgrade() else {
                    return Ok(());
                };
                cache.set(&key, "fresh", Expiration::Never, None).await?;
                Ok(())
            }
        })
        .await;

    cache
        .set("key", "stale", Expiration::Never, Some(Duration::from_millis(1)))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;

    assert_eq!(cache.get("key").await.unwrap(), Some(Value::from("stale")));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(cache.get("key").await.unwrap(), Some(Value::from("fresh")));
}

#[tokio::test]
async fn test_failed_refresh_is_queued_again_on_next_stale_read() {
    let cache = memory_cache(1);
    let attempts = Arc::new(AtomicUsize::new(0));
    let seen = attempts.clone();
    cache
        .on_refresh_needed(move |_key| {
            let seen = seen.clone();
            async move {
                seen.fetch_add(1, Ordering::SeqCst);
                Err(anyhow::anyhow!("origin unavailable"))
            }
        })
        .await;

    cache
        .set("key", "stale", Expiration::Never, Some(Duration::from_millis(1)))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;

    assert_eq!(cache.get("key").await.unwrap(), Some(Value::from("stale")));
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
    assert_eq!(cache.refresh_pending().await, 0);

    // Deadline is not reset, so the value stays stale
    assert_eq!(cache.get("key").await.unwrap(), Some(Value::from("stale")));
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_expired_entry_is_not_refreshed() {
    let cache = memory_cache(1);
    let counter = count_refreshes(&cache, Duration::ZERO).await;

    cache
        .set(
            "key",
            "value",
            Duration::from_millis(5).into(),
            Some(Duration::from_millis(1)),
        )
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(15)).await;

    assert_eq!(cache.get("key").await.unwrap(), None);
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(counter.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_cleared_callback_is_not_called() {
    let cache = memory_cache(1);
    let counter = count_refreshes(&cache, Duration::ZERO).await;
    cache.clear_refresh_callback().await;

    cache
        .set("key", 1u8, Expiration::Never, Some(Duration::from_millis(1)))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;
    cache.get("key").await.unwrap();

    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(counter.load(Ordering::SeqCst), 0);
    assert_eq!(cache.refresh_pending().await, 0);
}

// == Lifecycle ==

#[tokio::test]
async fn test_janitor_sweeps_expired_entries() {
    init_tracing();
    let storage = Arc::new(MemoryStorage::new());
    let cache = Cache::new(
        None,
        Some(Duration::from_millis(20)),
        0,
        storage.clone(),
    )
    .unwrap();

    cache
        .set("short", 1i32, Duration::from_millis(10).into(), None)
        .await
        .unwrap();
    cache.set("long", 2i32, Expiration::Never, None).await.unwrap();
    assert_eq!(storage.len().await, 2);

    tokio::time::sleep(Duration::from_millis(80)).await;
    assert_eq!(storage.len().await, 1);
    assert_eq!(cache.get("long").await.unwrap(), Some(Value::I32(2)));
}

#[tokio::test]
async fn test_shutdown_stops_refresh() {
    let cache = memory_cache(1);
    let counter = count_refreshes(&cache, Duration::ZERO).await;
    cache.shutdown();
    tokio::time::sleep(Duration::from_millis(20)).await;

    cache
        .set("key", "stale", Expiration::Never, Some(Duration::from_millis(1)))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;

    // Reads and writes keep working
    assert_eq!(cache.get("key").await.unwrap(), Some(Value::from("stale")));
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(counter.load(Ordering::SeqCst), 0);
    assert_eq!(cache.refresh_pending().await, 0);
}

#[tokio::test]
async fn test_weak_handle_dies_with_cache() {
    let cache = memory_cache(2);
    let weak = cache.downgrade();
    let clone = cache.clone();

    drop(cache);
    assert!(weak.upgrade().is_some());
    drop(clone);
    assert!(weak.upgrade().is_none());
}

#[tokio::test]
async fn test_from_config_memory() {
    init_tracing();
    let config = Config {
        default_expiration_ms: 10,
        refresh_workers: 1,
        ..Config::default()
    };
    let cache = Cache::from_config(&config).await.unwrap();
    assert_eq!(cache.storage_kind(), StorageKind::Memory);
    assert_eq!(cache.default_expiration(), Some(Duration::from_millis(10)));

    cache.set("key", true, Expiration::Default, None).await.unwrap();
    assert_eq!(cache.get("key").await.unwrap(), Some(Value::Bool(true)));
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(cache.get("key").await.unwrap(), None);
}

#[tokio::test]
async fn test_flush_then_typed_arithmetic() {
    let cache = memory_cache(0);
    cache.set("hits", 10u32, Expiration::Never, None).await.unwrap();
    assert_eq!(cache.increment_u32("hits", 5).await.unwrap(), 15);
    assert_eq!(cache.decrement_u32("hits", 20).await.unwrap(), u32::MAX - 4);

    cache.flush().await.unwrap();
    let result = cache.increment_u32("hits", 1).await;
    assert!(matches!(result, Err(CacheError::NotFound(_))));
}
