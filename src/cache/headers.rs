//! Cache-related response headers.

use axum::http::{HeaderMap, HeaderName, HeaderValue};
use time::{OffsetDateTime, UtcOffset, format_description::BorrowedFormatItem, macros::format_description};

pub const CACHEABLE_HEADER: &str = "x-cacheable";
pub const CACHE_STATE_HEADER: &str = "x-cache";
pub const CACHE_HIT_HEADER: &str = "x-cache-hit";

const HTTP_DATE: &[BorrowedFormatItem<'static>] = format_description!(
    "[weekday repr:short], [day] [month repr:short] [year] [hour]:[minute]:[second] GMT"
);

/// How a response relates to the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheDisposition {
    /// Served from the cache.
    Hit { max_age: u64 },
    /// Computed live, eligible for caching.
    Miss,
    /// Computed live, never cached.
    NotCacheable,
}

impl CacheDisposition {
    /// Header name/value pairs for this disposition, in emission order.
    pub fn headers(self, now: OffsetDateTime) -> Vec<(&'static str, String)> {
        let (cache_control, cacheable, state, hit, pragma) = match self {
            CacheDisposition::Hit { max_age } => (
                format!("public, max-age={max_age}"),
                "yes",
                "cached",
                "HIT",
                "cache",
            ),
            CacheDisposition::Miss => (
                "public, max-age=0, must-revalidate".to_string(),
                "yes",
                "uncached",
                "MISS",
                "no-cache",
            ),
            CacheDisposition::NotCacheable => (
                "public, max-age=0, must-revalidate".to_string(),
                "no",
                "uncached",
                "MISS",
                "no-cache",
            ),
        };

        vec![
            ("cache-control", cache_control),
            (CACHEABLE_HEADER, cacheable.to_string()),
            (CACHE_STATE_HEADER, state.to_string()),
            (CACHE_HIT_HEADER, hit.to_string()),
            ("pragma", pragma.to_string()),
            ("date", http_date(now)),
        ]
    }

    /// Set this disposition's headers on a stored header list, replacing any
    /// existing values case-insensitively.
    pub fn apply_to_list(self, headers: &mut Vec<(String, String)>, now: OffsetDateTime) {
        for (name, value) in self.headers(now) {
            headers.retain(|(existing, _)| !existing.eq_ignore_ascii_case(name));
            headers.push((name.to_string(), value));
        }
    }

    /// Set this disposition's headers on a live response.
    pub fn apply_to_map(self, headers: &mut HeaderMap, now: OffsetDateTime) {
        for (name, value) in self.headers(now) {
            if let Ok(value) = HeaderValue::from_str(&value) {
                headers.insert(HeaderName::from_static(name), value);
            }
        }
    }
}

/// IMF-fixdate rendering used for the `Date` header.
pub fn http_date(now: OffsetDateTime) -> String {
    now.to_offset(UtcOffset::UTC)
        .format(HTTP_DATE)
        .unwrap_or_default()
}
