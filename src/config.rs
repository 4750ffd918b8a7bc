use std::time::Duration;

use serde::Deserialize;

use crate::ConfigError;

/// Configuration for a [`Cache`](crate::Cache).
///
/// The defaults give an unbounded cache whose entries never expire: values
/// stay until they are invalidated or the cache is dropped.
///
/// ```yaml
/// name: artists
/// time_to_live: 5m
/// max_entries: 500
/// ```
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CacheConfig {
    /// Label attached to this cache's log spans.
    pub name: String,

    /// How long a loaded value may be served before it is fetched again.
    #[serde(with = "humantime_serde")]
    pub time_to_live: Option<Duration>,

    /// Upper bound on loaded values. When exceeded, the oldest values are evicted.
    /// Values that are still loading do not count.
    pub max_entries: Option<usize>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            name: "default".to_owned(),
            time_to_live: None,
            max_entries: None,
        }
    }
}

impl CacheConfig {
    /// Creates a default config with the given name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Sets how long loaded values are served.
    pub fn with_time_to_live(mut self, time_to_live: Duration) -> Self {
        self.time_to_live = Some(time_to_live);
        self
    }

    /// Sets the maximum number of loaded values.
    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = Some(max_entries);
        self
    }

    /// Parses a config from YAML and validates it.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that the config can be used to build a cache.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_entries == Some(0) {
            return Err(ConfigError::ZeroCapacity);
        }
        Ok(())
    }
}
