//! Cache configuration.
//!
//! Controls key namespaces, entry lifetime, language handling and the policy
//! markers the gate uses to tell public routes from protected ones.

use std::num::NonZeroUsize;

use serde::Deserialize;

// Default values for cache configuration
pub(crate) const DEFAULT_DOMAIN: &str = "tagcache";
pub(crate) const DEFAULT_TAGS_DOMAIN: &str = "tagcache_tags";
pub(crate) const DEFAULT_TTL_SECONDS: u64 = 3600;
pub(crate) const DEFAULT_IDENTITY_SEPARATOR: &str = "#";
pub(crate) const DEFAULT_LANGUAGE: &str = "en";
pub(crate) const DEFAULT_PUBLIC_PERMISSION: &str = "access content";
pub(crate) const DEFAULT_AUTH_MIDDLEWARE: &str = "auth";
pub(crate) const DEFAULT_RECORD_LIMIT: usize = 10_000;
pub(crate) const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;

/// Cache configuration, usually built from the `[cache]` table of `tagcache.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Master switch for the response cache layer and the trigger.
    pub enabled: bool,
    /// Key namespace of cached responses.
    pub domain: String,
    /// Namespace of the tag index.
    pub tags_domain: String,
    /// Lifetime of a cached response, also advertised as `max-age` on hits.
    pub ttl_seconds: u64,
    /// Joins a key to its identity suffix.
    pub identity_separator: String,
    /// Two-letter language codes accepted from `Accept-Language`.
    pub languages: Vec<String>,
    /// Language used when the request names none or an unknown one.
    pub default_language: String,
    /// The universal view permission; a route requiring only this is public.
    pub public_permission: String,
    /// Middleware id marking routes that run the session/auth phase.
    pub auth_middleware: String,
    /// Capacity of the in-memory record backend.
    pub record_limit: usize,
    /// Responses with larger bodies are passed through uncached.
    pub max_body_bytes: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            domain: DEFAULT_DOMAIN.to_string(),
            tags_domain: DEFAULT_TAGS_DOMAIN.to_string(),
            ttl_seconds: DEFAULT_TTL_SECONDS,
            identity_separator: DEFAULT_IDENTITY_SEPARATOR.to_string(),
            languages: vec![DEFAULT_LANGUAGE.to_string()],
            default_language: DEFAULT_LANGUAGE.to_string(),
            public_permission: DEFAULT_PUBLIC_PERMISSION.to_string(),
            auth_middleware: DEFAULT_AUTH_MIDDLEWARE.to_string(),
            record_limit: DEFAULT_RECORD_LIMIT,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

impl CacheConfig {
    /// Returns the record limit as NonZeroUsize, clamping to 1 if zero.
    pub fn record_limit_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.record_limit).unwrap_or(NonZeroUsize::MIN)
    }

    /// Reduce an `Accept-Language` value to a configured two-letter code.
    ///
    /// Values longer than two characters are cut to their first two letters
    /// and lowercased; anything not listed in `languages` falls back to
    /// `default_language`.
    pub fn normalize_language(&self, raw: Option<&str>) -> String {
        let Some(raw) = raw.map(str::trim).filter(|value| !value.is_empty()) else {
            return self.default_language.clone();
        };

        let code: String = raw.chars().take(2).collect::<String>().to_lowercase();
        if self.languages.iter().any(|language| *language == code) {
            code
        } else {
            self.default_language.clone()
        }
    }
}
