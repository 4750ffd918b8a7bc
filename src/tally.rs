//! Per-song play and favorite counts, aggregated from raw event rows.
//!
//! The backend hands out one row per play and one row per favorite. Counting
//! happens here, usually inside a cached producer so that a listing page only
//! aggregates once per session.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;

use serde::Deserialize;

/// One play of a song, as stored by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PlayEvent {
    pub song_id: String,
    /// `None` for anonymous listeners.
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub played_at: Option<String>,
}

/// A user marking a song as favorite.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FavoriteEvent {
    pub song_id: String,
    pub user_id: String,
}

/// Occurrence counts per key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tally<K: Eq + Hash> {
    counts: HashMap<K, u64>,
}

impl<K: Eq + Hash> Default for Tally<K> {
    fn default() -> Self {
        Self {
            counts: HashMap::new(),
        }
    }
}

impl<K: Eq + Hash> Tally<K> {
    /// Creates an empty tally.
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts every occurrence of every key.
    pub fn from_keys<I>(keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
    {
        let mut tally = Self::new();
        for key in keys {
            tally.add(key, 1);
        }
        tally
    }

    /// Adds `count` occurrences of `key`.
    pub fn add(&mut self, key: K, count: u64) {
        *self.counts.entry(key).or_insert(0) += count;
    }

    /// Returns the count for `key`, zero if it was never seen.
    pub fn count<Q>(&self, key: &Q) -> u64
    where
        K: std::borrow::Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.counts.get(key).copied().unwrap_or(0)
    }

    /// Sum of all counts.
    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }

    /// Number of distinct keys.
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    /// Returns `true` if nothing was counted.
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Adds every count of `other` to this tally.
    pub fn merge(&mut self, other: Tally<K>) {
        for (key, count) in other.counts {
            self.add(key, count);
        }
    }

    /// Iterates over the distinct keys, in no particular order.
    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.counts.keys()
    }
}

impl<K: Eq + Hash + Ord + Clone> Tally<K> {
    /// The `n` most frequent keys, highest count first, ties by ascending key.
    pub fn top(&self, n: usize) -> Vec<(K, u64)> {
        let mut ranked: Vec<(K, u64)> = self
            .counts
            .iter()
            .map(|(key, count)| (key.clone(), *count))
            .collect();
        ranked.sort_unstable_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked.truncate(n);
        ranked
    }
}

impl<K: Eq + Hash> FromIterator<K> for Tally<K> {
    fn from_iter<I: IntoIterator<Item = K>>(iter: I) -> Self {
        Self::from_keys(iter)
    }
}

/// Plays per song.
pub fn play_counts<'a, I>(plays: I) -> Tally<String>
where
    I: IntoIterator<Item = &'a PlayEvent>,
{
    plays.into_iter().map(|play| play.song_id.clone()).collect()
}

/// Favorites per song. A user favoriting the same song twice counts once.
pub fn favorite_counts<'a, I>(favorites: I) -> Tally<String>
where
    I: IntoIterator<Item = &'a FavoriteEvent>,
{
    let distinct: HashSet<(&str, &str)> = favorites
        .into_iter()
        .map(|fav| (fav.song_id.as_str(), fav.user_id.as_str()))
        .collect();
    distinct
        .into_iter()
        .map(|(song_id, _)| song_id.to_owned())
        .collect()
}

/// Distinct known listeners per song. Anonymous plays are ignored.
pub fn unique_listeners<'a, I>(plays: I) -> Tally<String>
where
    I: IntoIterator<Item = &'a PlayEvent>,
{
    let distinct: HashSet<(&str, &str)> = plays
        .into_iter()
        .filter_map(|play| Some((play.song_id.as_str(), play.user_id.as_deref()?)))
        .collect();
    distinct
        .into_iter()
        .map(|(song_id, _)| song_id.to_owned())
        .collect()
}

/// Aggregated counters for one song.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SongStats {
    pub song_id: String,
    pub plays: u64,
    pub favorites: u64,
}

/// Joins play and favorite counts into one row per song seen in either stream.
///
/// Rows are ordered by plays, then favorites, both descending, then by id.
pub fn song_stats(plays: &[PlayEvent], favorites: &[FavoriteEvent]) -> Vec<SongStats> {
    let plays = play_counts(plays);
    let favorites = favorite_counts(favorites);

    let song_ids: HashSet<&String> = plays.keys().chain(favorites.keys()).collect();
    let mut stats: Vec<SongStats> = song_ids
        .into_iter()
        .map(|song_id| SongStats {
            song_id: song_id.clone(),
            plays: plays.count(song_id.as_str()),
            favorites: favorites.count(song_id.as_str()),
        })
        .collect();

    stats.sort_unstable_by(|a, b| {
        b.plays
            .cmp(&a.plays)
            .then_with(|| b.favorites.cmp(&a.favorites))
            .then_with(|| a.song_id.cmp(&b.song_id))
    });
    stats
}
