//! A keyed async cache that deduplicates concurrent fetches
//!
//! This crate provides a `Cache` that memoizes the result of async producers
//! by string key. While a producer for a key is running, further requests for
//! that key wait for it instead of starting their own. Failures are passed
//! through to every waiter and never cached.
//!
//! The `tally` module aggregates raw play and favorite event rows into
//! per-song counts, typically inside a cached producer.

pub mod cache;
pub mod config;
pub mod error;
pub mod key;
pub mod tally;

pub use cache::{Cache, CacheStats};
pub use config::CacheConfig;
pub use error::{CacheError, ConfigError};
pub use key::CacheKey;
pub use tally::{FavoriteEvent, PlayEvent, SongStats, Tally};
