use futures::future::BoxFuture;
use keyed_cache::{Cache, CacheStats};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

fn counted(calls: &Arc<AtomicUsize>, value: i32) -> impl FnOnce() -> BoxFuture<'static, Result<i32, String>> {
    let calls = Arc::clone(calls);
    move || -> BoxFuture<'static, Result<i32, String>> {
        Box::pin(async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(value)
        })
    }
}

#[tokio::test]
async fn test_first_value_sticks() {
    let cache: Cache<i32, String> = Cache::new();

    let first = cache.get_or_fetch("x", || async { Ok(1) }).await.unwrap();
    assert_eq!(first, 1);

    let second = cache.get_or_fetch("x", || async { Ok(2) }).await.unwrap();
    assert_eq!(second, 1);
}

#[tokio::test]
async fn test_cache_hit_skips_producer() {
    let cache: Cache<i32, String> = Cache::new();
    let first_calls = Arc::new(AtomicUsize::new(0));
    let second_calls = Arc::new(AtomicUsize::new(0));

    let result1 = cache.get_or_fetch("artists_limit10", counted(&first_calls, 10)).await.unwrap();
    assert_eq!(result1, 10);
    assert_eq!(first_calls.load(Ordering::SeqCst), 1);

    let result2 = cache.get_or_fetch("artists_limit10", counted(&second_calls, 20)).await.unwrap();
    assert_eq!(result2, 10);
    assert_eq!(first_calls.load(Ordering::SeqCst), 1);
    assert_eq!(second_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_invalidate_forces_refetch() {
    let cache: Cache<i32, String> = Cache::new();
    let calls = Arc::new(AtomicUsize::new(0));

    cache.get_or_fetch("albums", counted(&calls, 1)).await.unwrap();
    cache.invalidate("albums");
    assert!(cache.get("albums").is_none());

    let refreshed = cache.get_or_fetch("albums", counted(&calls, 2)).await.unwrap();
    assert_eq!(refreshed, 2);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_unknown_keys() {
    let cache: Cache<i32, String> = Cache::new();

    cache.invalidate("never_seen");
    assert!(!cache.is_loading("never_seen"));
    assert!(cache.get("never_seen").is_none());
    assert!(cache.is_empty());
}

#[tokio::test]
async fn test_delete_operations() {
    let cache: Cache<i32, String> = Cache::new();

    cache.get_or_fetch("playlist_songs_1", || async { Ok(1) }).await.unwrap();
    cache.get_or_fetch("playlist_songs_2", || async { Ok(2) }).await.unwrap();
    assert_eq!(cache.len(), 2);

    cache.invalidate("playlist_songs_1");
    assert_eq!(cache.len(), 1);
    assert_eq!(cache.get("playlist_songs_2"), Some(2));

    cache.invalidate_all();
    assert_eq!(cache.len(), 0);
    assert!(cache.is_empty());
}

#[tokio::test]
async fn test_stats() {
    let cache: Cache<i32, String> = Cache::new();

    cache.get_or_fetch("a", || async { Ok(1) }).await.unwrap();
    cache.get_or_fetch("a", || async { Ok(1) }).await.unwrap();
    cache.get_or_fetch("a", || async { Ok(1) }).await.unwrap();
    let _ = cache.get_or_fetch("b", || async { Err("nope".to_string()) }).await;

    assert_eq!(
        cache.stats(),
        CacheStats {
            hits: 2,
            misses: 2,
            coalesced: 0,
            failures: 1,
            abandoned: 0,
            evictions: 0,
        }
    );
}

#[tokio::test]
async fn test_clones_share_entries() {
    let cache: Cache<String, String> = Cache::new();
    let other = cache.clone();

    cache
        .get_or_fetch("genres", || async { Ok("rock,jazz".to_string()) })
        .await
        .unwrap();

    assert_eq!(other.get("genres").as_deref(), Some("rock,jazz"));
    other.invalidate("genres");
    assert!(cache.get("genres").is_none());
}

#[tokio::test]
async fn test_key_types() {
    let cache: Cache<i32, String> = Cache::new();
    let id = 42;

    cache
        .get_or_fetch(format!("playlist_songs_{}", id), || async move { Ok(id) })
        .await
        .unwrap();

    let key = keyed_cache::CacheKey::new("playlist_songs_42");
    assert_eq!(cache.get(key.as_str()), Some(42));
    assert_eq!(cache.get_or_fetch(&key, || async { Ok(0) }).await.unwrap(), 42);
}
