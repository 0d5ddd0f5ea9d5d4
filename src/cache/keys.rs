//! Cache key construction.
//!
//! A key is `{domain}_{intent}:{raw}:{language}`, optionally followed by
//! `{separator}{identity}` for a per-caller variant. The identity part is a
//! SHA-256 digest of the bearer token, so tokens never end up in keys.

use std::fmt;

use sha2::{Digest, Sha256};

/// Sub-purpose of a key within a cache domain.
///
/// Separate intents let future caches share a backend without colliding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheIntent {
    /// Responses keyed by request URI.
    Url,
}

impl CacheIntent {
    pub fn as_str(self) -> &'static str {
        match self {
            CacheIntent::Url => "url",
        }
    }
}

impl fmt::Display for CacheIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fully built cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// Build a key. Pure: equal inputs always give equal keys.
    pub fn build(
        domain: &str,
        intent: CacheIntent,
        raw: &str,
        language: &str,
        identity: Option<(&str, &str)>,
    ) -> Self {
        let mut key = format!("{domain}_{intent}:{raw}:{language}");
        if let Some((separator, identity)) = identity {
            key.push_str(separator);
            key.push_str(identity);
        }
        Self(key)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<CacheKey> for String {
    fn from(key: CacheKey) -> Self {
        key.0
    }
}

/// Derive the identity suffix for a bearer token.
pub fn identity_suffix(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}
