//! Route policies and their lookup.

use std::collections::BTreeSet;

use async_trait::async_trait;
use serde::Deserialize;

/// Access-control and cacheability rules attached to a route.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RoutePolicy {
    pub permissions: BTreeSet<String>,
    pub roles: BTreeSet<String>,
    pub required_middleware: BTreeSet<String>,
    /// Tags every cached response of this route depends on.
    pub cache_tags: BTreeSet<String>,
    pub cacheable: bool,
}

impl RoutePolicy {
    /// True when the route runs the session/auth phase.
    pub fn requires_auth(&self, auth_middleware: &str) -> bool {
        self.required_middleware.contains(auth_middleware)
    }

    /// True when anyone may read the route: no roles, no permission beyond
    /// the universal view permission, and no auth phase.
    pub fn is_public(&self, public_permission: &str, auth_middleware: &str) -> bool {
        let permissions_open = self.permissions.is_empty()
            || (self.permissions.len() == 1 && self.permissions.contains(public_permission));

        self.roles.is_empty() && permissions_open && !self.requires_auth(auth_middleware)
    }
}

/// Finds the policy for a request path.
#[async_trait]
pub trait RouteResolver: Send + Sync + 'static {
    async fn resolve(&self, path: &str) -> Option<RoutePolicy>;
}

/// One registered route.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RouteEntry {
    /// Path pattern; `{name}` segments match any single segment.
    pub path: String,
    #[serde(flatten)]
    pub policy: RoutePolicy,
}

/// Declarative route registry.
///
/// Patterns are compared segment by segment after stripping the leading `/`
/// and any query string; the first matching entry wins.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    entries: Vec<RouteEntry>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_route(mut self, path: impl Into<String>, policy: RoutePolicy) -> Self {
        self.register(path, policy);
        self
    }

    pub fn register(&mut self, path: impl Into<String>, policy: RoutePolicy) {
        self.entries.push(RouteEntry {
            path: path.into(),
            policy,
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn find(&self, path: &str) -> Option<&RoutePolicy> {
        let requested = split_path(path);
        self.entries
            .iter()
            .find(|entry| pattern_matches(&entry.path, &requested))
            .map(|entry| &entry.policy)
    }
}

impl From<Vec<RouteEntry>> for RouteTable {
    fn from(entries: Vec<RouteEntry>) -> Self {
        Self { entries }
    }
}

#[async_trait]
impl RouteResolver for RouteTable {
    async fn resolve(&self, path: &str) -> Option<RoutePolicy> {
        self.find(path).cloned()
    }
}

fn split_path(path: &str) -> Vec<&str> {
    let path = path.split('?').next().unwrap_or_default();
    path.trim_start_matches('/').split('/').collect()
}

fn pattern_matches(pattern: &str, requested: &[&str]) -> bool {
    let segments = split_path(pattern);
    segments.len() == requested.len()
        && segments
            .iter()
            .zip(requested)
            .all(|(segment, value)| is_placeholder(segment) || segment == value)
}

fn is_placeholder(segment: &str) -> bool {
    segment.len() >= 2 && segment.starts_with('{') && segment.ends_with('}')
}
