use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures::channel::oneshot;
use futures::future::{FutureExt, Shared};
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::Instrument;

use crate::{CacheConfig, CacheError, CacheKey, ConfigError};

type FlightResult<V, E> = Result<V, CacheError<E>>;
type FlightChannel<V, E> = Shared<oneshot::Receiver<FlightResult<V, E>>>;

/// A loaded value, optionally with the instant it stops being served.
#[derive(Debug, Clone)]
struct Expiring<V> {
    value: V,
    expires_at: Option<Instant>,
    /// Insertion order, used to pick eviction victims.
    seq: u64,
}

impl<V> Expiring<V> {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|expires_at| now >= expires_at)
    }
}

enum Entry<V, E> {
    Loading {
        flight: u64,
        channel: FlightChannel<V, E>,
    },
    Ready(Expiring<V>),
}

impl<V, E> Entry<V, E> {
    fn is_live(&self, now: Instant) -> bool {
        match self {
            Entry::Loading { .. } => true,
            Entry::Ready(item) => !item.is_expired(now),
        }
    }
}

enum Lookup<V, E> {
    Hit(V),
    Join(FlightChannel<V, E>),
    Miss,
}

struct State<V, E> {
    entries: HashMap<CacheKey, Entry<V, E>>,
    next_id: u64,
}

impl<V, E> State<V, E> {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn is_current_flight(&self, key: &CacheKey, flight: u64) -> bool {
        matches!(
            self.entries.get(key),
            Some(Entry::Loading { flight: current, .. }) if *current == flight
        )
    }

    /// Stores the value a flight produced.
    ///
    /// The slot is only written if it still belongs to this flight or is vacant
    /// because the key was invalidated mid-flight. A newer flight or value wins.
    fn complete_flight(
        &mut self,
        key: &CacheKey,
        flight: u64,
        value: V,
        expires_at: Option<Instant>,
    ) -> bool {
        if !self.is_current_flight(key, flight) && self.entries.contains_key(key) {
            return false;
        }
        let seq = self.next_id();
        self.entries.insert(
            key.clone(),
            Entry::Ready(Expiring {
                value,
                expires_at,
                seq,
            }),
        );
        true
    }

    /// Removes the `Loading` marker of `flight`, leaving anything newer alone.
    fn abort_flight(&mut self, key: &CacheKey, flight: u64) -> bool {
        if self.is_current_flight(key, flight) {
            self.entries.remove(key);
            return true;
        }
        false
    }

    /// Drops values whose time-to-live has passed. Returns how many were dropped.
    fn purge_expired(&mut self, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.is_live(now));
        let purged = before - self.entries.len();
        if purged > 0 {
            tracing::debug!("Purged {} expired entries", purged);
        }
        purged
    }

    /// Drops expired values, then evicts the oldest loaded values until at most
    /// `max_entries` remain. Returns the number of evicted (unexpired) values.
    fn enforce_capacity(&mut self, max_entries: usize, now: Instant) -> u64 {
        self.purge_expired(now);

        let mut ready: Vec<(u64, CacheKey)> = self
            .entries
            .iter()
            .filter_map(|(key, entry)| match entry {
                Entry::Ready(item) => Some((item.seq, key.clone())),
                Entry::Loading { .. } => None,
            })
            .collect();
        if ready.len() <= max_entries {
            return 0;
        }

        ready.sort_unstable_by_key(|(seq, _)| *seq);
        let excess = ready.len() - max_entries;
        for (_, key) in ready.into_iter().take(excess) {
            tracing::debug!("Evicting {} to stay within {} entries", key, max_entries);
            self.entries.remove(&key);
        }
        excess as u64
    }
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    coalesced: AtomicU64,
    failures: AtomicU64,
    abandoned: AtomicU64,
    evictions: AtomicU64,
}

/// A point-in-time snapshot of a cache's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups answered from a loaded value.
    pub hits: u64,
    /// Lookups that started a new fetch.
    pub misses: u64,
    /// Lookups that joined a fetch already in flight.
    pub coalesced: u64,
    /// Fetches whose producer returned an error.
    pub failures: u64,
    /// Fetches whose producer never returned.
    pub abandoned: u64,
    /// Values evicted to respect `max_entries`.
    pub evictions: u64,
}

/// Removes a flight's `Loading` marker when the flight ends, no matter how.
///
/// The guard exists before the producer is called. If the producer panics,
/// either while building its future or while it runs, unwinding drops this
/// guard, so waiters are released and the key is fetched afresh on the next call.
struct FlightGuard<V, E> {
    state: Arc<Mutex<State<V, E>>>,
    counters: Arc<Counters>,
    key: CacheKey,
    flight: u64,
    settled: bool,
}

impl<V, E> Drop for FlightGuard<V, E> {
    fn drop(&mut self) {
        let removed = self.state.lock().abort_flight(&self.key, self.flight);
        if removed && !self.settled {
            self.counters.abandoned.fetch_add(1, Ordering::Relaxed);
            tracing::warn!("Computation of {} was abandoned", self.key);
        }
    }
}

/// A keyed async cache that runs at most one fetch per key at a time.
///
/// [`get_or_fetch`](Self::get_or_fetch) returns the loaded value for a key, or
/// runs the given producer to load it. Callers asking for a key while its
/// producer is still running wait for that same producer instead of starting
/// their own, and all of them receive the same value or the same error.
///
/// Loaded values are kept until [`invalidate`](Self::invalidate)d, unless the
/// [`CacheConfig`] sets a time-to-live or an entry bound. Failures are never
/// cached: a failed key is removed and the next call fetches it again.
///
/// Clones share the same underlying entries.
pub struct Cache<V, E> {
    config: CacheConfig,
    state: Arc<Mutex<State<V, E>>>,
    counters: Arc<Counters>,
}

impl<V, E> Clone for Cache<V, E> {
    fn clone(&self) -> Self {
        Cache {
            config: self.config.clone(),
            state: Arc::clone(&self.state),
            counters: Arc::clone(&self.counters),
        }
    }
}

impl<V, E> std::fmt::Debug for Cache<V, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cache")
            .field("config", &self.config)
            .field("entries", &self.state.lock().entries.len())
            .finish()
    }
}

impl<V, E> Default for Cache<V, E> {
    fn default() -> Self {
        Self::from_parts(CacheConfig::default())
    }
}

impl<V, E> Cache<V, E> {
    /// Creates an unbounded cache whose values never expire.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a cache with the given configuration.
    pub fn with_config(config: CacheConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::from_parts(config))
    }

    fn from_parts(config: CacheConfig) -> Self {
        Self {
            config,
            state: Arc::new(Mutex::new(State {
                entries: HashMap::new(),
                next_id: 0,
            })),
            counters: Arc::new(Counters::default()),
        }
    }

    /// Gets the configuration this cache was created with.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Removes the entry for `key`, if any.
    ///
    /// A fetch already running for `key` is not cancelled. It still completes,
    /// and stores its value unless another fetch has claimed the key meanwhile.
    pub fn invalidate(&self, key: &str) {
        if self.state.lock().entries.remove(key).is_some() {
            tracing::debug!("Invalidated {} in {} cache", key, self.config.name);
        }
    }

    /// Removes every entry. Running fetches behave as for [`invalidate`](Self::invalidate).
    pub fn invalidate_all(&self) {
        let mut state = self.state.lock();
        let count = state.entries.len();
        state.entries.clear();
        tracing::debug!("Invalidated {} entries in {} cache", count, self.config.name);
    }

    /// Returns `true` while a fetch for `key` is in flight.
    pub fn is_loading(&self, key: &str) -> bool {
        matches!(self.state.lock().entries.get(key), Some(Entry::Loading { .. }))
    }

    /// Number of entries, loading or loaded. Expired values are not counted.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        let state = self.state.lock();
        state.entries.values().filter(|entry| entry.is_live(now)).count()
    }

    /// Returns `true` if there are no loading or loaded entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Gets a snapshot of the hit, miss and failure counters.
    pub fn stats(&self) -> CacheStats {
        let counters = &self.counters;
        CacheStats {
            hits: counters.hits.load(Ordering::Relaxed),
            misses: counters.misses.load(Ordering::Relaxed),
            coalesced: counters.coalesced.load(Ordering::Relaxed),
            failures: counters.failures.load(Ordering::Relaxed),
            abandoned: counters.abandoned.load(Ordering::Relaxed),
            evictions: counters.evictions.load(Ordering::Relaxed),
        }
    }
}

impl<V, E> Cache<V, E>
where
    V: Clone,
{
    /// Returns the loaded value for `key` without fetching.
    ///
    /// Returns `None` if the key is missing, expired or still loading.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        match self.state.lock().entries.get(key) {
            Some(Entry::Ready(item)) if !item.is_expired(now) => Some(item.value.clone()),
            _ => None,
        }
    }
}

impl<V, E> Cache<V, E>
where
    V: Clone + Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    /// Returns the value for `key`, calling `producer` to load it on a miss.
    ///
    /// - A loaded value is returned right away and `producer` is not called.
    /// - If a fetch for `key` is already in flight, this waits for it and
    ///   returns its outcome. `producer` is not called.
    /// - Otherwise `key` is marked as loading and `producer` is called once.
    ///   Its future is spawned onto the Tokio runtime, so it runs to completion
    ///   even if every caller stops waiting.
    ///
    /// On failure the key is removed again and the error is handed, unchanged,
    /// to this caller and every caller that joined the fetch.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime, or if `producer` itself
    /// panics before returning its future. The key is left vacant either way.
    pub async fn get_or_fetch<K, F, Fut>(&self, key: K, producer: F) -> Result<V, CacheError<E>>
    where
        K: Into<CacheKey>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        let key = key.into();
        let name = &self.config.name;

        let (channel, flight) = {
            let mut state = self.state.lock();
            let now = Instant::now();

            let lookup = match state.entries.get(&key) {
                Some(Entry::Ready(item)) if !item.is_expired(now) => {
                    Lookup::Hit(item.value.clone())
                }
                Some(Entry::Loading { channel, .. }) => Lookup::Join(channel.clone()),
                _ => Lookup::Miss,
            };

            match lookup {
                Lookup::Hit(value) => {
                    tracing::trace!("Cache hit for {} in {} cache", key, name);
                    self.counters.hits.fetch_add(1, Ordering::Relaxed);
                    return Ok(value);
                }
                Lookup::Join(channel) => {
                    // A concurrent lookup was deduplicated.
                    tracing::trace!("Joining in-flight computation of {} in {} cache", key, name);
                    self.counters.coalesced.fetch_add(1, Ordering::Relaxed);
                    (channel, None)
                }
                Lookup::Miss => {
                    tracing::debug!("Cache miss for {} in {} cache", key, name);
                    self.counters.misses.fetch_add(1, Ordering::Relaxed);

                    let flight = state.next_id();
                    let (sender, receiver) = oneshot::channel();
                    let channel = receiver.shared();
                    state.entries.insert(
                        key.clone(),
                        Entry::Loading {
                            flight,
                            channel: channel.clone(),
                        },
                    );
                    (channel, Some((flight, sender)))
                }
            }
        };

        match flight {
            Some((flight, sender)) => {
                // The guard owns the `Loading` marker before any user code runs, so a
                // producer that panics while building its future still clears it.
                let guard = self.flight_guard(key.clone(), flight);
                // The producer runs outside of the lock, it may well use this cache itself.
                let computation = producer();
                self.spawn_flight(guard, computation, sender);
            }
            None => drop(producer),
        }

        channel
            .await
            .unwrap_or_else(move |_cancelled| Err(CacheError::Abandoned { key }))
    }

    fn flight_guard(&self, key: CacheKey, flight: u64) -> FlightGuard<V, E> {
        FlightGuard {
            state: Arc::clone(&self.state),
            counters: Arc::clone(&self.counters),
            key,
            flight,
            settled: false,
        }
    }

    fn spawn_flight<Fut>(
        &self,
        mut guard: FlightGuard<V, E>,
        computation: Fut,
        sender: oneshot::Sender<FlightResult<V, E>>,
    ) where
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        let span = tracing::debug_span!("cache_flight", cache = %self.config.name, key = %guard.key);
        let time_to_live = self.config.time_to_live;
        let max_entries = self.config.max_entries;

        let task = async move {
            let result = computation.await.map_err(|err| CacheError::Producer(Arc::new(err)));

            match &result {
                Ok(value) => {
                    let now = Instant::now();
                    let expires_at = time_to_live.map(|ttl: Duration| now + ttl);
                    let mut state = guard.state.lock();
                    if state.complete_flight(&guard.key, guard.flight, value.clone(), expires_at) {
                        tracing::debug!("Stored {}", guard.key);
                        if let Some(max_entries) = max_entries {
                            let evicted = state.enforce_capacity(max_entries, now);
                            guard.counters.evictions.fetch_add(evicted, Ordering::Relaxed);
                        } else if time_to_live.is_some() {
                            state.purge_expired(now);
                        }
                    } else {
                        tracing::debug!("Discarding {}, the key was claimed by a newer fetch", guard.key);
                    }
                }
                Err(_) => {
                    tracing::debug!("Computation of {} failed", guard.key);
                    guard.counters.failures.fetch_add(1, Ordering::Relaxed);
                }
            }

            // Drop the guard first to settle the map. This ensures that callers either
            // see the final state of the key, or get a channel that will receive data.
            guard.settled = true;
            drop(guard);

            // All receivers may be gone, the value is cached regardless.
            let _ = sender.send(result);
        };

        tokio::spawn(task.instrument(span));
    }
}
