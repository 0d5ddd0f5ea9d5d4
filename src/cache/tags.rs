//! Tag index.
//!
//! Maps each invalidation tag to the set of record keys that depend on it,
//! so invalidation touches only the affected keys instead of the whole bin.
//! Tag entries are persisted without expiry; membership of records that
//! already expired lingers until the tag is invalidated or pruned.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, histogram};
use tracing::{debug, info};

use super::backend::CacheBackend;
use super::error::CacheError;
use super::store::CacheStore;

const METRIC_INVALIDATED_KEYS: &str = "tagcache_invalidated_keys_total";
const METRIC_INVALIDATE_MS: &str = "tagcache_invalidate_ms";

/// Entity kind of navigation-menu links.
pub const MENU_LINK_KIND: &str = "menu_link_content";
/// Aggregate tag standing for every menu link.
pub const MENU_LINKS_TAG: &str = "menu_link_content";

/// A reference to a piece of content that changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityRef {
    pub kind: String,
    pub id: String,
    /// Further tags the entity declares it affects.
    pub dependency_tags: Vec<String>,
}

impl EntityRef {
    pub fn new(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            id: id.into(),
            dependency_tags: Vec::new(),
        }
    }

    pub fn with_dependency_tags(mut self, tags: impl IntoIterator<Item = String>) -> Self {
        self.dependency_tags.extend(tags);
        self
    }

    /// `{kind}:{id}`
    pub fn own_tag(&self) -> String {
        format!("{}:{}", self.kind, self.id)
    }

    pub fn is_menu_link(&self) -> bool {
        self.kind == MENU_LINK_KIND
    }

    /// The entity's own tag followed by its dependency tags, deduplicated.
    pub fn cache_tags(&self) -> Vec<String> {
        let mut seen = BTreeSet::new();
        std::iter::once(self.own_tag())
            .chain(self.dependency_tags.iter().cloned())
            .filter(|tag| seen.insert(tag.clone()))
            .collect()
    }
}

/// What a content-mutation event names when asking for invalidation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identifier {
    /// A bare tag.
    Tag(String),
    /// A structured content reference.
    Entity(EntityRef),
}

impl Identifier {
    /// Tags to invalidate for this identifier.
    ///
    /// Menu links collapse into the aggregate menu tag: menu trees are
    /// rendered as a whole, so a per-link tag would miss most dependents.
    pub fn tags(&self) -> Vec<String> {
        match self {
            Identifier::Tag(tag) => vec![tag.clone()],
            Identifier::Entity(entity) if entity.is_menu_link() => vec![MENU_LINKS_TAG.to_string()],
            Identifier::Entity(entity) => entity.cache_tags(),
        }
    }
}

impl From<&str> for Identifier {
    fn from(tag: &str) -> Self {
        Identifier::Tag(tag.to_string())
    }
}

impl From<EntityRef> for Identifier {
    fn from(entity: EntityRef) -> Self {
        Identifier::Entity(entity)
    }
}

/// Tag → key-set index over its own backend bin.
#[derive(Clone)]
pub struct TagIndex {
    backend: Arc<dyn CacheBackend>,
    records: CacheStore,
}

impl TagIndex {
    pub fn new(backend: Arc<dyn CacheBackend>, records: CacheStore) -> Self {
        Self { backend, records }
    }

    /// Record that `key` depends on each of `tags`. Registering an existing
    /// membership again changes nothing; concurrent registrations under one
    /// tag are all kept.
    pub async fn register(&self, key: &str, tags: &[String]) -> Result<(), CacheError> {
        let key = [key.to_string()];
        for tag in tags {
            self.backend.add_members(tag, &key).await?;
        }
        Ok(())
    }

    /// Keys currently recorded under `tag`.
    pub async fn keys_for(&self, tag: &str) -> Result<BTreeSet<String>, CacheError> {
        self.backend.members(tag).await
    }

    /// Remove every record registered under any of `tags`, then their
    /// membership.
    ///
    /// Issues one bulk delete on the record bin. Only the members read here
    /// are removed from each tag, so a key registered meanwhile stays
    /// indexed. Returns the number of distinct keys removed.
    pub async fn invalidate_tags(&self, tags: &[String]) -> Result<usize, CacheError> {
        let started_at = Instant::now();
        let mut keys = BTreeSet::new();
        let mut emptied = Vec::new();

        for tag in tags {
            let members = self.keys_for(tag).await?;
            if members.is_empty() {
                continue;
            }
            keys.extend(members.iter().cloned());
            emptied.push((tag.clone(), members));
        }

        if emptied.is_empty() {
            debug!(tags = ?tags, "no indexed keys for tags");
            return Ok(0);
        }

        let keys: Vec<String> = keys.into_iter().collect();
        self.records.delete_many(&keys).await?;
        for (tag, members) in &emptied {
            let members: Vec<String> = members.iter().cloned().collect();
            self.backend.remove_members(tag, &members).await?;
        }

        info!(
            tags = ?emptied.iter().map(|(tag, _)| tag.as_str()).collect::<Vec<_>>(),
            key_count = keys.len(),
            "Invalidated cache entries by tag"
        );
        counter!(METRIC_INVALIDATED_KEYS).increment(keys.len() as u64);
        histogram!(METRIC_INVALIDATE_MS).record(started_at.elapsed().as_secs_f64() * 1000.0);

        Ok(keys.len())
    }

    pub async fn invalidate_by_identifier(
        &self,
        identifier: &Identifier,
    ) -> Result<usize, CacheError> {
        self.invalidate_tags(&identifier.tags()).await
    }

    /// Drop members of `tags` whose records are gone.
    ///
    /// Not run automatically; hosts that want to bound stale membership can
    /// call it from a periodic task. Returns the number of members dropped.
    pub async fn prune(&self, tags: &[String]) -> Result<usize, CacheError> {
        let mut dropped = 0;
        for tag in tags {
            let mut dead = Vec::new();
            for key in self.keys_for(tag).await? {
                if !self.records.exists(&key).await? {
                    dead.push(key);
                }
            }
            if dead.is_empty() {
                continue;
            }
            dropped += dead.len();
            self.backend.remove_members(tag, &dead).await?;
        }
        Ok(dropped)
    }

    /// Drop every tag entry.
    pub async fn clear(&self) -> Result<(), CacheError> {
        self.backend.delete_all().await
    }
}
