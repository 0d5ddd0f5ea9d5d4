//! Tag-indexed response cache.
//!
//! Two backend bins back the cache:
//!
//! - **records**: serialized responses keyed by [`CacheKey`], each with a TTL
//! - **tags**: tag → set of record keys, without expiry
//!
//! [`ResponseCacheGate`] decides per request whether a stored response may be
//! served, and creates entries from live responses. [`InvalidationTrigger`]
//! drops entries by tag when content changes.
//!
//! ## Configuration
//!
//! Cache behavior is controlled via `tagcache.toml`:
//!
//! ```toml
//! [cache]
//! enabled = true
//! ttl_seconds = 3600
//! languages = ["en", "de"]
//! # ... see config.rs for all options
//! ```

mod backend;
mod config;
pub mod deps;
mod error;
mod gate;
mod headers;
mod keys;
mod lock;
mod middleware;
mod store;
mod tags;
mod trigger;

use std::sync::Arc;

pub use backend::{CacheBackend, MemoryBackend};
pub use config::CacheConfig;
pub use error::CacheError;
pub use gate::{
    CacheWrite, CachedResponse, FallthroughReason, GateDecision, LiveResponse, ResponseCacheGate,
};
pub use headers::{
    CACHE_HIT_HEADER, CACHE_STATE_HEADER, CACHEABLE_HEADER, CacheDisposition, http_date,
};
pub use keys::{CacheIntent, CacheKey, identity_suffix};
pub use middleware::{CacheState, extract_bearer, response_cache_layer};
pub use store::{CacheRecord, CacheStore};
pub use tags::{EntityRef, Identifier, MENU_LINK_KIND, MENU_LINKS_TAG, TagIndex};
pub use trigger::InvalidationTrigger;

use crate::access::{IdentityProvider, RouteResolver};

/// The wired cache: one gate and one trigger over shared bins.
#[derive(Clone)]
pub struct CacheServices {
    pub gate: Arc<ResponseCacheGate>,
    pub trigger: Arc<InvalidationTrigger>,
}

impl CacheServices {
    /// Wire the cache over in-memory bins: a record bin sized from `config`
    /// and an unbounded tag bin.
    pub fn in_memory(
        config: CacheConfig,
        routes: Arc<dyn RouteResolver>,
        identity: Arc<dyn IdentityProvider>,
    ) -> Self {
        let records = Arc::new(MemoryBackend::new(
            config.domain.clone(),
            config.record_limit_non_zero(),
        ));
        let tags = Arc::new(MemoryBackend::unbounded(config.tags_domain.clone()));
        Self::with_backends(config, records, tags, routes, identity)
    }

    /// Wire the cache over caller-provided bins.
    pub fn with_backends(
        config: CacheConfig,
        records: Arc<dyn CacheBackend>,
        tags: Arc<dyn CacheBackend>,
        routes: Arc<dyn RouteResolver>,
        identity: Arc<dyn IdentityProvider>,
    ) -> Self {
        let store = CacheStore::new(records);
        let index = TagIndex::new(tags, store.clone());

        let gate = ResponseCacheGate::new(
            config.clone(),
            store.clone(),
            index.clone(),
            routes,
            identity,
        );
        let trigger = InvalidationTrigger::new(config, store, index);

        Self {
            gate: Arc::new(gate),
            trigger: Arc::new(trigger),
        }
    }

    /// Middleware state for [`response_cache_layer`].
    pub fn state(&self) -> CacheState {
        CacheState::new(self.gate.clone())
    }
}
