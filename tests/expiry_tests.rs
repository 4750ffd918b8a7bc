use keyed_cache::{Cache, CacheConfig, ConfigError};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

fn counting_cache(config: CacheConfig) -> (Cache<String, String>, Arc<AtomicUsize>) {
    let cache = Cache::with_config(config).unwrap();
    (cache, Arc::new(AtomicUsize::new(0)))
}

async fn fetch(cache: &Cache<String, String>, calls: &Arc<AtomicUsize>, key: &str) -> String {
    let calls = calls.clone();
    let value = format!("loaded_{}", key);
    cache
        .get_or_fetch(key, move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(value)
        })
        .await
        .unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_time_to_live() {
    let config = CacheConfig::named("artists").with_time_to_live(Duration::from_secs(60));
    let (cache, calls) = counting_cache(config);

    assert_eq!(fetch(&cache, &calls, "artists").await, "loaded_artists");

    tokio::time::advance(Duration::from_secs(30)).await;
    fetch(&cache, &calls, "artists").await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(cache.get("artists").as_deref(), Some("loaded_artists"));

    tokio::time::advance(Duration::from_secs(31)).await;
    assert!(cache.get("artists").is_none());
    assert_eq!(cache.len(), 0);

    fetch(&cache, &calls, "artists").await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(cache.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_no_expiry_by_default() {
    let (cache, calls) = counting_cache(CacheConfig::default());

    fetch(&cache, &calls, "songs").await;
    tokio::time::advance(Duration::from_secs(24 * 60 * 60)).await;
    fetch(&cache, &calls, "songs").await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_max_entries_evicts_oldest() {
    let (cache, calls) = counting_cache(CacheConfig::named("albums").with_max_entries(2));

    fetch(&cache, &calls, "a").await;
    fetch(&cache, &calls, "b").await;
    fetch(&cache, &calls, "c").await;

    assert_eq!(cache.len(), 2);
    assert!(cache.get("a").is_none());
    assert!(cache.get("b").is_some());
    assert!(cache.get("c").is_some());
    assert_eq!(cache.stats().evictions, 1);

    fetch(&cache, &calls, "a").await;
    assert_eq!(calls.load(Ordering::SeqCst), 4);
    assert!(cache.get("b").is_none());
}

#[test]
fn test_zero_capacity_rejected() {
    let result = Cache::<String, String>::with_config(CacheConfig::default().with_max_entries(0));
    assert!(matches!(result, Err(ConfigError::ZeroCapacity)));
}

#[test]
fn test_config_from_yaml() {
    let config = CacheConfig::from_yaml("name: playlists\ntime_to_live: 10m\n").unwrap();
    let cache = Cache::<String, String>::with_config(config).unwrap();

    assert_eq!(cache.config().name, "playlists");
    assert_eq!(cache.config().time_to_live, Some(Duration::from_secs(600)));
}
