use std::sync::Arc;

use crate::CacheKey;

/// Error returned by [`Cache::get_or_fetch`](crate::Cache::get_or_fetch).
///
/// Every caller that joined the same fetch receives the same outcome, so the
/// producer's error is shared behind an [`Arc`] instead of being cloned or
/// converted.
#[derive(Debug, thiserror::Error)]
pub enum CacheError<E> {
    /// The producer failed. The cache entry was removed, the next call retries.
    #[error("{0}")]
    Producer(Arc<E>),

    /// The producer task ended without a result, e.g. because it panicked or
    /// the runtime shut down.
    #[error("computation for `{key}` was abandoned before completing")]
    Abandoned { key: CacheKey },
}

impl<E> CacheError<E> {
    /// Returns the producer's error, if that is what failed.
    pub fn producer_error(&self) -> Option<&E> {
        match self {
            CacheError::Producer(err) => Some(err.as_ref()),
            CacheError::Abandoned { .. } => None,
        }
    }

    pub fn is_abandoned(&self) -> bool {
        matches!(self, CacheError::Abandoned { .. })
    }
}

// Not derived: `E` itself does not need to be `Clone`.
impl<E> Clone for CacheError<E> {
    fn clone(&self) -> Self {
        match self {
            CacheError::Producer(err) => CacheError::Producer(Arc::clone(err)),
            CacheError::Abandoned { key } => CacheError::Abandoned { key: key.clone() },
        }
    }
}

/// Error returned when a [`CacheConfig`](crate::CacheConfig) is unusable.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("max_entries must be greater than zero")]
    ZeroCapacity,

    #[error("failed to parse cache config YAML")]
    Parse(#[from] serde_yaml::Error),
}
