//! Pluggable key-value backends.
//!
//! The cache keeps no state of its own: records and the tag index live in a
//! shared store behind [`CacheBackend`]. [`MemoryBackend`] is the in-process
//! implementation used for single-node deployments and tests.

use std::collections::BTreeSet;
use std::num::NonZeroUsize;
use std::sync::RwLock;

use async_trait::async_trait;
use bytes::Bytes;
use lru::LruCache;
use metrics::counter;
use time::OffsetDateTime;
use tracing::debug;

use super::error::CacheError;
use super::lock::{rw_read, rw_write};

const SOURCE: &str = "cache::backend";
const METRIC_BACKEND_EVICT: &str = "tagcache_backend_evict_total";

/// A shared key-value store with per-entry expiry and set-valued entries.
///
/// Writes replace whole values. A `set` needs to be visible to later `get`
/// calls from any worker only eventually. Deleting a missing key is a no-op.
///
/// The `*_members` operations work on set-valued entries (Redis `SADD`,
/// `SREM`, `SMEMBERS`) and must each be atomic per key: concurrent
/// `add_members` calls on one key never lose each other's members. A bin
/// holding the tag index must not evict entries.
#[async_trait]
pub trait CacheBackend: Send + Sync + 'static {
    /// Name used in logs and errors.
    fn name(&self) -> &str;

    async fn get(&self, key: &str) -> Result<Option<Bytes>, CacheError>;

    /// Store `value`; `expires_at = None` keeps it until deleted.
    async fn set(
        &self,
        key: &str,
        value: Bytes,
        expires_at: Option<OffsetDateTime>,
    ) -> Result<(), CacheError>;

    async fn delete_many(&self, keys: &[String]) -> Result<(), CacheError>;

    async fn delete_all(&self) -> Result<(), CacheError>;

    /// Members of the set at `key`; empty when absent.
    async fn members(&self, key: &str) -> Result<BTreeSet<String>, CacheError>;

    /// Union `members` into the set at `key`, creating it when absent.
    async fn add_members(&self, key: &str, members: &[String]) -> Result<(), CacheError>;

    /// Remove `members` from the set at `key`; an emptied set is deleted.
    async fn remove_members(&self, key: &str, members: &[String]) -> Result<(), CacheError>;
}

#[derive(Clone)]
enum Stored {
    Value(Bytes),
    Members(BTreeSet<String>),
}

#[derive(Clone)]
struct StoredValue {
    stored: Stored,
    expires_at: Option<OffsetDateTime>,
}

impl StoredValue {
    fn is_live(&self, now: OffsetDateTime) -> bool {
        self.expires_at.is_none_or(|expires_at| now < expires_at)
    }
}

/// In-process backend with optional LRU eviction.
pub struct MemoryBackend {
    name: String,
    entries: RwLock<LruCache<String, StoredValue>>,
}

impl MemoryBackend {
    /// A bin holding at most `capacity` entries, evicting the least recently
    /// used one beyond that.
    pub fn new(name: impl Into<String>, capacity: NonZeroUsize) -> Self {
        Self {
            name: name.into(),
            entries: RwLock::new(LruCache::new(capacity)),
        }
    }

    /// A bin that never evicts. Required for the tag index.
    pub fn unbounded(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: RwLock::new(LruCache::unbounded()),
        }
    }

    /// Number of physically present entries, expired ones included.
    pub fn len(&self) -> usize {
        rw_read(&self.entries, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn wrong_type(&self, key: &str) -> CacheError {
        CacheError::backend(
            self.name.clone(),
            format!("entry `{key}` holds a different kind of value"),
        )
    }

    fn record_eviction(&self, evicted: Option<(String, StoredValue)>, key: &str) {
        if let Some((evicted_key, _)) = evicted.filter(|(evicted_key, _)| evicted_key != key) {
            counter!(METRIC_BACKEND_EVICT, "bin" => self.name.clone()).increment(1);
            debug!(bin = %self.name, key = %evicted_key, "evicted entry at capacity");
        }
    }
}

#[async_trait]
impl CacheBackend for MemoryBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get(&self, key: &str) -> Result<Option<Bytes>, CacheError> {
        let mut entries = rw_write(&self.entries, SOURCE, "get");
        let now = OffsetDateTime::now_utc();
        match entries.get(key) {
            None => return Ok(None),
            Some(stored) if !stored.is_live(now) => {}
            Some(StoredValue {
                stored: Stored::Value(value),
                ..
            }) => return Ok(Some(value.clone())),
            Some(_) => return Err(self.wrong_type(key)),
        }
        entries.pop(key);
        Ok(None)
    }

    async fn set(
        &self,
        key: &str,
        value: Bytes,
        expires_at: Option<OffsetDateTime>,
    ) -> Result<(), CacheError> {
        let evicted = rw_write(&self.entries, SOURCE, "set").push(
            key.to_string(),
            StoredValue {
                stored: Stored::Value(value),
                expires_at,
            },
        );
        self.record_eviction(evicted, key);
        Ok(())
    }

    async fn delete_many(&self, keys: &[String]) -> Result<(), CacheError> {
        if keys.is_empty() {
            return Ok(());
        }
        let mut entries = rw_write(&self.entries, SOURCE, "delete_many");
        for key in keys {
            entries.pop(key.as_str());
        }
        Ok(())
    }

    async fn delete_all(&self) -> Result<(), CacheError> {
        rw_write(&self.entries, SOURCE, "delete_all").clear();
        Ok(())
    }

    async fn members(&self, key: &str) -> Result<BTreeSet<String>, CacheError> {
        match rw_read(&self.entries, SOURCE, "members").peek(key) {
            Some(StoredValue {
                stored: Stored::Members(members),
                ..
            }) => Ok(members.clone()),
            Some(_) => Err(self.wrong_type(key)),
            None => Ok(BTreeSet::new()),
        }
    }

    async fn add_members(&self, key: &str, members: &[String]) -> Result<(), CacheError> {
        if members.is_empty() {
            return Ok(());
        }

        let mut entries = rw_write(&self.entries, SOURCE, "add_members");
        match entries.get_mut(key) {
            Some(StoredValue {
                stored: Stored::Members(existing),
                ..
            }) => {
                existing.extend(members.iter().cloned());
                return Ok(());
            }
            Some(_) => return Err(self.wrong_type(key)),
            None => {}
        }
        let evicted = entries.push(
            key.to_string(),
            StoredValue {
                stored: Stored::Members(members.iter().cloned().collect()),
                expires_at: None,
            },
        );
        drop(entries);
        self.record_eviction(evicted, key);
        Ok(())
    }

    async fn remove_members(&self, key: &str, members: &[String]) -> Result<(), CacheError> {
        let mut entries = rw_write(&self.entries, SOURCE, "remove_members");
        let emptied = match entries.get_mut(key) {
            Some(StoredValue {
                stored: Stored::Members(existing),
                ..
            }) => {
                for member in members {
                    existing.remove(member);
                }
                existing.is_empty()
            }
            Some(_) => return Err(self.wrong_type(key)),
            None => false,
        };
        if emptied {
            entries.pop(key);
        }
        Ok(())
    }
}
