//! Invalidation trigger.
//!
//! Entry point for content-mutation events. Translates what changed into
//! tags and drops the dependent cache records through the tag index.

use tracing::{debug, info, warn};

use super::config::CacheConfig;
use super::error::CacheError;
use super::store::CacheStore;
use super::tags::{EntityRef, Identifier, MENU_LINK_KIND, TagIndex};

/// Cache trigger for content changes.
///
/// # Usage
///
/// ```ignore
/// // After a successful page update:
/// trigger.content_changed(EntityRef::new("node", "42")).await?;
/// ```
pub struct InvalidationTrigger {
    config: CacheConfig,
    store: CacheStore,
    tags: TagIndex,
}

impl InvalidationTrigger {
    pub fn new(config: CacheConfig, store: CacheStore, tags: TagIndex) -> Self {
        Self {
            config,
            store,
            tags,
        }
    }

    /// Drop every record registered under any of `tags`.
    ///
    /// Returns the number of records removed; zero when the cache is
    /// disabled.
    pub async fn invalidate_tags(&self, tags: &[String]) -> Result<usize, CacheError> {
        if !self.config.enabled {
            debug!(tags = ?tags, "Cache trigger skipped: cache disabled");
            return Ok(0);
        }
        self.tags.invalidate_tags(tags).await
    }

    pub async fn invalidate_by_identifier(
        &self,
        identifier: &Identifier,
    ) -> Result<usize, CacheError> {
        self.invalidate_tags(&identifier.tags()).await
    }

    /// A piece of content was created, updated or deleted.
    pub async fn content_changed(&self, entity: EntityRef) -> Result<usize, CacheError> {
        self.invalidate_by_identifier(&Identifier::Entity(entity))
            .await
    }

    /// A navigation link changed; every menu rendering is dropped.
    pub async fn menu_link_changed(&self, id: impl Into<String>) -> Result<usize, CacheError> {
        self.content_changed(EntityRef::new(MENU_LINK_KIND, id))
            .await
    }

    /// Drop every cached record and every tag entry.
    pub async fn flush_all(&self) -> Result<(), CacheError> {
        if !self.config.enabled {
            debug!("Cache flush skipped: cache disabled");
            return Ok(());
        }

        self.store.delete_all().await?;
        if let Err(error) = self.tags.clear().await {
            warn!(error = %error, "Records flushed but tag index not cleared");
            return Err(error);
        }

        info!(bin = self.store.bin(), "Flushed response cache");
        Ok(())
    }
}
