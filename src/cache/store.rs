//! Cached response records and their store.
//!
//! Records live in one backend bin and are encoded as JSON with a base64
//! payload. Expiry is lazy: a record past `expires_at` reads as absent even
//! if the backend still holds it.

use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::debug;

use super::backend::CacheBackend;
use super::error::CacheError;

/// A cached response as stored in the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheRecord {
    pub key: String,
    #[serde(with = "payload_encoding")]
    pub payload: Bytes,
    pub status: u16,
    pub headers: Vec<(String, String)>,
    /// Set once cache-control headers and the payload timestamp were
    /// synthesized for this generation of the entry.
    pub headers_frozen: bool,
    #[serde(with = "time::serde::timestamp")]
    pub expires_at: OffsetDateTime,
    pub language: String,
    /// Tags the record was registered under.
    pub tags: Vec<String>,
}

impl CacheRecord {
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        now >= self.expires_at
    }

    /// First value of a header, matched case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Typed access to the record bin.
///
/// `exists` followed by `set` is not atomic. Two workers filling the same
/// miss may both write; the later write wins and both carry equivalent
/// payloads. Backend writes replace whole values, so readers never observe a
/// mix of the two.
#[derive(Clone)]
pub struct CacheStore {
    backend: Arc<dyn CacheBackend>,
}

impl CacheStore {
    pub fn new(backend: Arc<dyn CacheBackend>) -> Self {
        Self { backend }
    }

    pub fn bin(&self) -> &str {
        self.backend.name()
    }

    pub async fn get(&self, key: &str) -> Result<Option<CacheRecord>, CacheError> {
        let Some(bytes) = self.backend.get(key).await? else {
            return Ok(None);
        };

        let record: CacheRecord =
            serde_json::from_slice(&bytes).map_err(|source| CacheError::Decode {
                key: key.to_string(),
                source,
            })?;

        if record.is_expired_at(OffsetDateTime::now_utc()) {
            debug!(bin = %self.bin(), key, "record expired");
            return Ok(None);
        }

        Ok(Some(record))
    }

    /// Write a record under its own key, replacing any previous value.
    pub async fn set(&self, record: &CacheRecord) -> Result<(), CacheError> {
        let bytes = serde_json::to_vec(record).map_err(|source| CacheError::Encode {
            key: record.key.clone(),
            source,
        })?;
        self.backend
            .set(&record.key, Bytes::from(bytes), Some(record.expires_at))
            .await
    }

    pub async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        Ok(self.get(key).await?.is_some())
    }

    pub async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.backend.delete_many(&[key.to_string()]).await
    }

    pub async fn delete_many(&self, keys: &[String]) -> Result<(), CacheError> {
        if keys.is_empty() {
            return Ok(());
        }
        self.backend.delete_many(keys).await
    }

    pub async fn delete_all(&self) -> Result<(), CacheError> {
        self.backend.delete_all().await
    }
}

mod payload_encoding {
    use base64::{Engine as _, engine::general_purpose::STANDARD};
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serializer, de::Error as _};

    pub fn serialize<S: Serializer>(payload: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(payload))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Bytes, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map(Bytes::from)
            .map_err(D::Error::custom)
    }
}
