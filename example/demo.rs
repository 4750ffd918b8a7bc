use keyed_cache::tally::{self, FavoriteEvent, PlayEvent};
use keyed_cache::{Cache, CacheConfig};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

const LOAD_DELAY_MS: u64 = 100;
const CONFIG: &str = "
name: listener-ui
time_to_live: 5m
max_entries: 100
";

/// Stands in for a backend query that returns artist names.
async fn query_artists(limit: usize, calls: Arc<AtomicUsize>) -> Result<Vec<String>, String> {
    calls.fetch_add(1, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(LOAD_DELAY_MS)).await;
    Ok((1..=limit).map(|i| format!("Artist {}", i)).collect())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cache: Arc<Cache<Vec<String>, String>> =
        Arc::new(Cache::with_config(CacheConfig::from_yaml(CONFIG)?)?);
    let calls = Arc::new(AtomicUsize::new(0));

    println!("Loading artists from three components at once...");
    let mut handles = Vec::new();
    for _ in 0..3 {
        let cache = cache.clone();
        let calls = calls.clone();
        handles.push(tokio::spawn(async move {
            cache
                .get_or_fetch("artists_limit10", move || query_artists(10, calls))
                .await
        }));
    }
    for handle in handles {
        let artists = handle.await??;
        println!("Got {} artists", artists.len());
    }
    println!("Backend queries: {}", calls.load(Ordering::SeqCst));

    println!("A failing query is not cached:");
    let failed = cache
        .get_or_fetch("playlist_songs_7", || async { Err("row not found".to_string()) })
        .await;
    println!("First attempt: {:?}", failed.map(|songs| songs.len()));
    let songs = cache
        .get_or_fetch("playlist_songs_7", || async { Ok(vec!["Intro".to_string()]) })
        .await?;
    println!("Second attempt: {:?}", songs);

    cache.invalidate("artists_limit10");
    println!("Cache size after invalidation: {}", cache.len());
    println!("Stats: {:?}", cache.stats());

    let plays = vec![
        PlayEvent {
            song_id: "intro".to_string(),
            user_id: Some("u1".to_string()),
            played_at: None,
        },
        PlayEvent {
            song_id: "intro".to_string(),
            user_id: None,
            played_at: None,
        },
        PlayEvent {
            song_id: "outro".to_string(),
            user_id: Some("u2".to_string()),
            played_at: None,
        },
    ];
    let favorites = vec![FavoriteEvent {
        song_id: "outro".to_string(),
        user_id: "u1".to_string(),
    }];
    for row in tally::song_stats(&plays, &favorites) {
        println!("{}: {} plays, {} favorites", row.song_id, row.plays, row.favorites);
    }

    Ok(())
}
