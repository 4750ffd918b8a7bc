use std::borrow::Borrow;
use std::fmt;

/// Identifies one cacheable unit of async work, e.g. `"artists_limit10"`.
///
/// Keys are opaque to the cache. Two requests share a cache entry if and only
/// if their keys compare equal, so choosing unique keys is up to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// Creates a key from any string.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Gets the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for CacheKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<String> for CacheKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

impl From<&str> for CacheKey {
    fn from(key: &str) -> Self {
        Self(key.to_owned())
    }
}

impl From<&String> for CacheKey {
    fn from(key: &String) -> Self {
        Self(key.clone())
    }
}

impl From<&CacheKey> for CacheKey {
    fn from(key: &CacheKey) -> Self {
        key.clone()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn test_lookup_by_str() {
        let mut map = HashMap::new();
        map.insert(CacheKey::from("playlist_songs_7"), 7);

        assert_eq!(map.get("playlist_songs_7"), Some(&7));
        assert_eq!(map.get("playlist_songs_8"), None);
    }

    #[test]
    fn test_display() {
        let key = CacheKey::new(format!("artists_limit{}", 10));
        assert_eq!(key.to_string(), "artists_limit10");
        assert_eq!(key.as_str(), "artists_limit10");
    }
}
