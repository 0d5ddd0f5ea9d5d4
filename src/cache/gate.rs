//! Request-time cache decisions.
//!
//! A lookup walks `identity-scoped key → plain key → route policy → caller
//! check` and ends either in a served response or in a fallthrough to live
//! computation. Backend failures count as misses; auth failures never
//! surface as errors, they only deny the cached copy.

use std::collections::BTreeSet;
use std::sync::Arc;

use bytes::Bytes;
use metrics::counter;
use serde_json::Value;
use time::{Duration, OffsetDateTime};
use tracing::{debug, warn};

use crate::access::{IdentityProvider, RoutePolicy, RouteResolver, Subject};

use super::config::CacheConfig;
use super::error::CacheError;
use super::headers::CacheDisposition;
use super::keys::{CacheIntent, CacheKey, identity_suffix};
use super::store::{CacheRecord, CacheStore};
use super::tags::TagIndex;

const METRIC_GATE_HIT: &str = "tagcache_gate_hit_total";
const METRIC_GATE_MISS: &str = "tagcache_gate_miss_total";
const METRIC_GATE_DENIED: &str = "tagcache_gate_denied_total";
const METRIC_BACKEND_ERROR: &str = "tagcache_backend_error_total";

/// Payload field refreshed when a hit is frozen.
const TIMESTAMP_FIELD: &str = "timestamp";

/// A response ready to be sent from the cache.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl From<CacheRecord> for CachedResponse {
    fn from(record: CacheRecord) -> Self {
        Self {
            status: record.status,
            headers: record.headers,
            body: record.payload,
        }
    }
}

/// Why a request went on to live computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallthroughReason {
    /// No live record under either key.
    Miss,
    /// A private hit whose path matches no route.
    RouteUnresolved,
    /// The route is protected and the request carries no token.
    MissingToken,
    /// The token is invalid, expired, errored or malformed.
    TokenRejected,
    /// The token belongs to an anonymous subject.
    AnonymousSubject,
    /// No subject could be loaded for the token.
    SubjectUnavailable,
    InactiveSubject,
    /// The subject lacks a required permission or role.
    RequirementsUnmet,
}

impl FallthroughReason {
    pub fn as_str(self) -> &'static str {
        match self {
            FallthroughReason::Miss => "miss",
            FallthroughReason::RouteUnresolved => "route_unresolved",
            FallthroughReason::MissingToken => "missing_token",
            FallthroughReason::TokenRejected => "token_rejected",
            FallthroughReason::AnonymousSubject => "anonymous_subject",
            FallthroughReason::SubjectUnavailable => "subject_unavailable",
            FallthroughReason::InactiveSubject => "inactive_subject",
            FallthroughReason::RequirementsUnmet => "requirements_unmet",
        }
    }
}

/// Outcome of a lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum GateDecision {
    Serve(CachedResponse),
    Fallthrough(FallthroughReason),
}

impl GateDecision {
    pub fn is_served(&self) -> bool {
        matches!(self, GateDecision::Serve(_))
    }
}

/// Everything needed to create a cache entry.
#[derive(Debug, Clone)]
pub struct CacheWrite {
    pub key: CacheKey,
    pub payload: Bytes,
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub tags: Vec<String>,
    pub language: String,
}

/// A response computed live, offered to the write path.
#[derive(Debug, Clone)]
pub struct LiveResponse<'a> {
    pub is_get: bool,
    pub uri: &'a str,
    pub language: &'a str,
    pub token: Option<&'a str>,
    pub route: Option<&'a RoutePolicy>,
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
    /// Tags declared by the handler while it ran.
    pub declared_tags: BTreeSet<String>,
}

/// The request-time cache gate.
pub struct ResponseCacheGate {
    config: CacheConfig,
    store: CacheStore,
    tags: TagIndex,
    routes: Arc<dyn RouteResolver>,
    identity: Arc<dyn IdentityProvider>,
}

impl ResponseCacheGate {
    pub fn new(
        config: CacheConfig,
        store: CacheStore,
        tags: TagIndex,
        routes: Arc<dyn RouteResolver>,
        identity: Arc<dyn IdentityProvider>,
    ) -> Self {
        Self {
            config,
            store,
            tags,
            routes,
            identity,
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Key for a request URI, identity-scoped when a token is given.
    pub fn key_for(&self, uri: &str, language: &str, token: Option<&str>) -> CacheKey {
        let suffix = token.map(identity_suffix);
        CacheKey::build(
            &self.config.domain,
            CacheIntent::Url,
            uri,
            language,
            suffix
                .as_deref()
                .map(|suffix| (self.config.identity_separator.as_str(), suffix)),
        )
    }

    pub async fn resolve_route(&self, uri: &str) -> Option<RoutePolicy> {
        self.routes.resolve(path_of(uri)).await
    }

    /// Decide whether a GET request can be answered from the cache.
    ///
    /// Without a token only the plain key is consulted and a hit is public:
    /// the write path stores under the plain key only for routes that need
    /// no identity. With a token the identity-scoped key is tried first, and
    /// any hit is re-checked against the route policy before it is served.
    pub async fn lookup(&self, uri: &str, language: &str, token: Option<&str>) -> GateDecision {
        let plain = self.key_for(uri, language, None);

        let Some(token) = token else {
            return match self.fetch(&plain).await {
                Some(record) => {
                    debug!(cache = "gate", outcome = "hit", scope = "public", key = %plain);
                    counter!(METRIC_GATE_HIT, "scope" => "public").increment(1);
                    GateDecision::Serve(self.serve(record).await)
                }
                None => self.fallthrough(FallthroughReason::Miss),
            };
        };

        let scoped = self.key_for(uri, language, Some(token));
        let record = match self.fetch(&scoped).await {
            Some(record) => record,
            None => match self.fetch(&plain).await {
                Some(record) => record,
                None => return self.fallthrough(FallthroughReason::Miss),
            },
        };

        let Some(policy) = self.resolve_route(uri).await else {
            return self.fallthrough(FallthroughReason::RouteUnresolved);
        };

        if !policy.is_public(&self.config.public_permission, &self.config.auth_middleware) {
            if let Err(reason) = self.authorize(token, &policy).await {
                return self.fallthrough(reason);
            }
        }

        debug!(cache = "gate", outcome = "hit", scope = "checked", key = %record.key);
        counter!(METRIC_GATE_HIT, "scope" => "checked").increment(1);
        GateDecision::Serve(self.serve(record).await)
    }

    /// Create an entry unless its key already holds a live record.
    ///
    /// Returns `false` when the key exists or a backend write failed. Tags
    /// are registered before the record is written.
    pub async fn create(&self, write: CacheWrite) -> bool {
        let key = write.key.as_str();
        match self.store.exists(key).await {
            Ok(true) => {
                debug!(cache = "gate", key, "entry exists, create skipped");
                return false;
            }
            Ok(false) => {}
            Err(error) => {
                self.backend_failed("create.exists", &error);
                return false;
            }
        }

        let record = CacheRecord {
            key: key.to_string(),
            payload: write.payload,
            status: write.status,
            headers: write.headers,
            headers_frozen: false,
            expires_at: self.expires_at(),
            language: write.language,
            tags: write.tags,
        };

        if let Err(error) = self.tags.register(&record.key, &record.tags).await {
            self.backend_failed("create.register", &error);
            return false;
        }
        if let Err(error) = self.store.set(&record).await {
            self.backend_failed("create.set", &error);
            return false;
        }

        debug!(
            cache = "gate",
            key,
            tag_count = record.tags.len(),
            "cached live response"
        );
        true
    }

    /// Offer a live response to the cache.
    ///
    /// Only successful GET responses of cacheable routes are stored. Public
    /// routes use the plain key, which the lookup serves without a policy
    /// check. Any other route is stored under the caller's identity-scoped
    /// key, and not at all when the request carries no token.
    pub async fn store_live(&self, live: LiveResponse<'_>) -> bool {
        let Some(route) = live.route else {
            return false;
        };
        if !live.is_get || !route.cacheable || live.status >= 400 {
            return false;
        }

        let public = route.is_public(&self.config.public_permission, &self.config.auth_middleware);
        let scoped_token = match (public, live.token) {
            (true, _) => None,
            (false, Some(token)) => Some(token),
            (false, None) => {
                debug!(cache = "gate", uri = live.uri, "protected response without token, not cached");
                return false;
            }
        };
        let key = self.key_for(live.uri, live.language, scoped_token);

        let mut tags: BTreeSet<String> = route.cache_tags.clone();
        tags.extend(live.declared_tags);

        self.create(CacheWrite {
            key,
            payload: live.body,
            status: live.status,
            headers: live.headers,
            tags: tags.into_iter().collect(),
            language: live.language.to_string(),
        })
        .await
    }

    async fn fetch(&self, key: &CacheKey) -> Option<CacheRecord> {
        match self.store.get(key.as_str()).await {
            Ok(record) => record,
            Err(error) => {
                self.backend_failed("lookup", &error);
                None
            }
        }
    }

    async fn authorize(&self, token: &str, policy: &RoutePolicy) -> Result<Subject, FallthroughReason> {
        if token.is_empty() {
            return Err(FallthroughReason::MissingToken);
        }
        if !self.identity.verify_token(token).await.is_acceptable() {
            return Err(FallthroughReason::TokenRejected);
        }

        let identity = self
            .identity
            .identity_from_token(token)
            .await
            .ok_or(FallthroughReason::TokenRejected)?;
        if !identity.is_authenticated() {
            return Err(FallthroughReason::AnonymousSubject);
        }

        let subject = self
            .identity
            .load_subject(token)
            .await
            .ok_or(FallthroughReason::SubjectUnavailable)?;
        if !subject.active {
            return Err(FallthroughReason::InactiveSubject);
        }
        if !subject.satisfies(policy) {
            return Err(FallthroughReason::RequirementsUnmet);
        }

        Ok(subject)
    }

    /// Turn a record into a response, freezing it on its first hit.
    ///
    /// Freezing stamps hit headers and a fresh payload timestamp, then writes
    /// the record back under the same key, expiry and tags. A frozen record
    /// is served exactly as stored.
    async fn serve(&self, mut record: CacheRecord) -> CachedResponse {
        if record.headers_frozen {
            return record.into();
        }

        let now = OffsetDateTime::now_utc();
        CacheDisposition::Hit {
            max_age: self.config.ttl_seconds,
        }
        .apply_to_list(&mut record.headers, now);
        record.payload = refresh_timestamp(&record.payload, now);
        record.headers_frozen = true;

        if let Err(error) = self.store.set(&record).await {
            self.backend_failed("serve.freeze", &error);
        } else if let Err(error) = self.tags.register(&record.key, &record.tags).await {
            self.backend_failed("serve.register", &error);
        }

        record.into()
    }

    fn fallthrough(&self, reason: FallthroughReason) -> GateDecision {
        if reason == FallthroughReason::Miss {
            counter!(METRIC_GATE_MISS).increment(1);
        } else {
            counter!(METRIC_GATE_DENIED, "reason" => reason.as_str()).increment(1);
        }
        debug!(cache = "gate", outcome = "fallthrough", reason = reason.as_str());
        GateDecision::Fallthrough(reason)
    }

    fn backend_failed(&self, op: &'static str, error: &CacheError) {
        counter!(METRIC_BACKEND_ERROR, "op" => op).increment(1);
        warn!(cache = "gate", op, error = %error, "cache backend failed, continuing uncached");
    }

    fn expires_at(&self) -> OffsetDateTime {
        let ttl = i64::try_from(self.config.ttl_seconds).unwrap_or(i64::MAX);
        OffsetDateTime::now_utc().saturating_add(Duration::seconds(ttl))
    }
}

/// Path part of a request URI.
fn path_of(uri: &str) -> &str {
    uri.split('?').next().unwrap_or(uri)
}

/// Set the payload's top-level timestamp to `now`. Payloads that are not a
/// JSON object are returned unchanged.
fn refresh_timestamp(payload: &Bytes, now: OffsetDateTime) -> Bytes {
    let Ok(Value::Object(mut object)) = serde_json::from_slice::<Value>(payload) else {
        return payload.clone();
    };
    object.insert(TIMESTAMP_FIELD.to_string(), Value::from(now.unix_timestamp()));
    serde_json::to_vec(&object)
        .map(Bytes::from)
        .unwrap_or_else(|_| payload.clone())
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroUsize;

    use async_trait::async_trait;

    use super::*;
    use crate::access::{RouteTable, SubjectKind, TokenCheck, TokenIdentity};
    use crate::cache::backend::{CacheBackend, MemoryBackend};
    use crate::cache::headers::{CACHE_HIT_HEADER, CACHE_STATE_HEADER};

    const EDITOR_TOKEN: &str = "editor-token";
    const AUTHOR_TOKEN: &str = "author-token";
    const INACTIVE_TOKEN: &str = "inactive-token";
    const GUEST_TOKEN: &str = "guest-token";
    /// Valid and authenticated, but names a subject that no longer exists.
    const DELETED_TOKEN: &str = "deleted-token";

    /// Tokens are accepted by name; anything else is rejected.
    struct StubIdentity;

    #[async_trait]
    impl IdentityProvider for StubIdentity {
        async fn verify_token(&self, token: &str) -> TokenCheck {
            match token {
                EDITOR_TOKEN | AUTHOR_TOKEN | INACTIVE_TOKEN | GUEST_TOKEN | DELETED_TOKEN => {
                    TokenCheck::valid()
                }
                _ => TokenCheck {
                    expired: true,
                    ..TokenCheck::valid()
                },
            }
        }

        async fn identity_from_token(&self, token: &str) -> Option<TokenIdentity> {
            let (kind, subject_id) = match token {
                GUEST_TOKEN => (SubjectKind::Anonymous, 0),
                _ => (SubjectKind::Authenticated, 7),
            };
            Some(TokenIdentity { kind, subject_id })
        }

        async fn load_subject(&self, token: &str) -> Option<Subject> {
            let role = match token {
                EDITOR_TOKEN | INACTIVE_TOKEN => "editor",
                AUTHOR_TOKEN => "author",
                _ => return None,
            };
            Some(Subject {
                active: token != INACTIVE_TOKEN,
                permissions: ["access content".to_string()].into(),
                roles: [role.to_string()].into(),
            })
        }
    }

    struct FailingBackend;

    #[async_trait]
    impl CacheBackend for FailingBackend {
        fn name(&self) -> &str {
            "failing"
        }

        async fn get(&self, _key: &str) -> Result<Option<Bytes>, CacheError> {
            Err(CacheError::backend("failing", "connection refused"))
        }

        async fn set(
            &self,
            _key: &str,
            _value: Bytes,
            _expires_at: Option<OffsetDateTime>,
        ) -> Result<(), CacheError> {
            Err(CacheError::backend("failing", "connection refused"))
        }

        async fn delete_many(&self, _keys: &[String]) -> Result<(), CacheError> {
            Err(CacheError::backend("failing", "connection refused"))
        }

        async fn delete_all(&self) -> Result<(), CacheError> {
            Err(CacheError::backend("failing", "connection refused"))
        }

        async fn members(&self, _key: &str) -> Result<BTreeSet<String>, CacheError> {
            Err(CacheError::backend("failing", "connection refused"))
        }

        async fn add_members(&self, _key: &str, _members: &[String]) -> Result<(), CacheError> {
            Err(CacheError::backend("failing", "connection refused"))
        }

        async fn remove_members(&self, _key: &str, _members: &[String]) -> Result<(), CacheError> {
            Err(CacheError::backend("failing", "connection refused"))
        }
    }

    fn routes() -> RouteTable {
        RouteTable::new()
            .with_route(
                "v1/hero",
                RoutePolicy {
                    permissions: ["access content".to_string()].into(),
                    cache_tags: ["block_content:4".to_string()].into(),
                    cacheable: true,
                    ..Default::default()
                },
            )
            .with_route(
                "v1/drafts/{id}",
                RoutePolicy {
                    roles: ["editor".to_string()].into(),
                    required_middleware: ["auth".to_string()].into(),
                    cacheable: true,
                    ..Default::default()
                },
            )
            .with_route(
                "v1/search",
                RoutePolicy {
                    cacheable: false,
                    ..Default::default()
                },
            )
    }

    fn gate_over(records: Arc<dyn CacheBackend>) -> (ResponseCacheGate, TagIndex) {
        let store = CacheStore::new(records);
        let tags = TagIndex::new(Arc::new(MemoryBackend::unbounded("tags")), store.clone());
        let gate = ResponseCacheGate::new(
            CacheConfig {
                ttl_seconds: 600,
                ..CacheConfig::default()
            },
            store,
            tags.clone(),
            Arc::new(routes()),
            Arc::new(StubIdentity),
        );
        (gate, tags)
    }

    fn gate() -> (ResponseCacheGate, TagIndex) {
        gate_over(Arc::new(MemoryBackend::new(
            "records",
            NonZeroUsize::new(64).expect("non-zero"),
        )))
    }

    fn live<'a>(uri: &'a str, token: Option<&'a str>, route: Option<&'a RoutePolicy>) -> LiveResponse<'a> {
        LiveResponse {
            is_get: true,
            uri,
            language: "en",
            token,
            route,
            status: 200,
            headers: vec![("content-type".to_string(), "application/json".to_string())],
            body: Bytes::from_static(br#"{"timestamp":1,"data":"hero"}"#),
            declared_tags: BTreeSet::new(),
        }
    }

    fn header<'a>(response: &'a CachedResponse, name: &str) -> Option<&'a str> {
        response
            .headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    fn served(decision: GateDecision) -> CachedResponse {
        match decision {
            GateDecision::Serve(response) => response,
            GateDecision::Fallthrough(reason) => panic!("expected a hit, got {reason:?}"),
        }
    }

    #[test]
    fn identity_key_extends_plain_key() {
        let (gate, _) = gate();
        let plain = gate.key_for("/v1/hero", "en", None);
        let scoped = gate.key_for("/v1/hero", "en", Some("abc"));

        assert_eq!(plain.as_str(), "tagcache_url:/v1/hero:en");
        assert_eq!(
            scoped.as_str(),
            format!("tagcache_url:/v1/hero:en#{}", identity_suffix("abc"))
        );
    }

    #[tokio::test]
    async fn public_hit_freezes_once() {
        let (gate, _) = gate();
        let route = gate.resolve_route("/v1/hero").await.expect("route");
        assert!(gate.store_live(live("/v1/hero", None, Some(&route))).await);

        let first = served(gate.lookup("/v1/hero", "en", None).await);
        assert_eq!(header(&first, "cache-control"), Some("public, max-age=600"));
        assert_eq!(header(&first, CACHE_STATE_HEADER), Some("cached"));
        assert_eq!(header(&first, CACHE_HIT_HEADER), Some("HIT"));
        assert_eq!(header(&first, "content-type"), Some("application/json"));
        let body: Value = serde_json::from_slice(&first.body).expect("json body");
        assert_ne!(body["timestamp"], 1);
        assert_eq!(body["data"], "hero");

        let second = served(gate.lookup("/v1/hero", "en", None).await);
        assert_eq!(second, first);
    }

    #[tokio::test]
    async fn create_refuses_existing_keys() {
        let (gate, _) = gate();
        let write = CacheWrite {
            key: gate.key_for("/v1/hero", "en", None),
            payload: Bytes::from_static(b"first"),
            status: 200,
            headers: Vec::new(),
            tags: vec!["t1".to_string()],
            language: "en".to_string(),
        };
        let second = CacheWrite {
            payload: Bytes::from_static(b"second"),
            ..write.clone()
        };

        assert!(gate.create(write).await);
        assert!(!gate.create(second).await);

        let response = served(gate.lookup("/v1/hero", "en", None).await);
        assert_eq!(response.body, Bytes::from_static(b"first"));
    }

    #[tokio::test]
    async fn write_path_skips_ineligible_responses() {
        let (gate, _) = gate();
        let hero = gate.resolve_route("/v1/hero").await.expect("route");
        let search = gate.resolve_route("/v1/search").await.expect("route");

        let post = LiveResponse {
            is_get: false,
            ..live("/v1/hero", None, Some(&hero))
        };
        let failed = LiveResponse {
            status: 404,
            ..live("/v1/hero", None, Some(&hero))
        };

        assert!(!gate.store_live(post).await);
        assert!(!gate.store_live(failed).await);
        assert!(!gate.store_live(live("/v1/search", None, Some(&search))).await);
        assert!(!gate.store_live(live("/v1/unknown", None, None)).await);
        assert_eq!(
            gate.lookup("/v1/hero", "en", None).await,
            GateDecision::Fallthrough(FallthroughReason::Miss)
        );
    }

    #[tokio::test]
    async fn route_and_declared_tags_are_registered() {
        let (gate, tags) = gate();
        let route = gate.resolve_route("/v1/hero").await.expect("route");
        let response = LiveResponse {
            declared_tags: ["node:42".to_string()].into(),
            ..live("/v1/hero", None, Some(&route))
        };
        assert!(gate.store_live(response).await);

        let key = gate.key_for("/v1/hero", "en", None).into_string();
        for tag in ["block_content:4", "node:42"] {
            assert!(tags.keys_for(tag).await.expect("keys").contains(&key));
        }

        tags.invalidate_tags(&["node:42".to_string()])
            .await
            .expect("invalidate");
        assert!(!gate.lookup("/v1/hero", "en", None).await.is_served());
    }

    #[tokio::test]
    async fn protected_entries_are_identity_scoped() {
        let (gate, _) = gate();
        let route = gate.resolve_route("/v1/drafts/9").await.expect("route");
        assert!(
            gate.store_live(live("/v1/drafts/9", Some(EDITOR_TOKEN), Some(&route)))
                .await
        );

        assert!(gate.lookup("/v1/drafts/9", "en", Some(EDITOR_TOKEN)).await.is_served());
        assert_eq!(
            gate.lookup("/v1/drafts/9", "en", None).await,
            GateDecision::Fallthrough(FallthroughReason::Miss)
        );
    }

    #[tokio::test]
    async fn protected_responses_without_token_are_not_stored() {
        let (gate, _) = gate();
        let route = gate.resolve_route("/v1/drafts/9").await.expect("route");

        assert!(!gate.store_live(live("/v1/drafts/9", None, Some(&route))).await);
        assert!(!gate.lookup("/v1/drafts/9", "en", None).await.is_served());
    }

    #[tokio::test]
    async fn protected_hits_check_the_caller() {
        let (gate, _) = gate();
        // A plain-key entry for a protected route, as left behind by a host
        // that cached it before the route gained its auth requirement.
        assert!(
            gate.create(CacheWrite {
                key: gate.key_for("/v1/drafts/9", "en", None),
                payload: Bytes::from_static(b"{}"),
                status: 200,
                headers: Vec::new(),
                tags: Vec::new(),
                language: "en".to_string(),
            })
            .await
        );

        let cases = [
            (AUTHOR_TOKEN, FallthroughReason::RequirementsUnmet),
            (INACTIVE_TOKEN, FallthroughReason::InactiveSubject),
            (GUEST_TOKEN, FallthroughReason::AnonymousSubject),
            (DELETED_TOKEN, FallthroughReason::SubjectUnavailable),
            ("forged", FallthroughReason::TokenRejected),
            ("", FallthroughReason::MissingToken),
        ];
        for (token, reason) in cases {
            assert_eq!(
                gate.lookup("/v1/drafts/9", "en", Some(token)).await,
                GateDecision::Fallthrough(reason),
                "token {token:?}"
            );
        }

        assert!(gate.lookup("/v1/drafts/9", "en", Some(EDITOR_TOKEN)).await.is_served());
    }

    #[tokio::test]
    async fn public_hit_with_token_skips_caller_check() {
        let (gate, _) = gate();
        let route = gate.resolve_route("/v1/hero").await.expect("route");
        assert!(gate.store_live(live("/v1/hero", Some("forged"), Some(&route))).await);

        // Stored under the plain key because the route has no auth phase.
        assert!(gate.lookup("/v1/hero", "en", None).await.is_served());
        assert!(gate.lookup("/v1/hero", "en", Some("forged")).await.is_served());
    }

    #[tokio::test]
    async fn hit_on_unknown_route_falls_through_with_token() {
        let (gate, _) = gate();
        assert!(
            gate.create(CacheWrite {
                key: gate.key_for("/v1/retired", "en", None),
                payload: Bytes::from_static(b"{}"),
                status: 200,
                headers: Vec::new(),
                tags: Vec::new(),
                language: "en".to_string(),
            })
            .await
        );

        assert!(gate.lookup("/v1/retired", "en", None).await.is_served());
        assert_eq!(
            gate.lookup("/v1/retired", "en", Some(EDITOR_TOKEN)).await,
            GateDecision::Fallthrough(FallthroughReason::RouteUnresolved)
        );
    }

    #[tokio::test]
    async fn languages_do_not_share_entries() {
        let (gate, _) = gate();
        let route = gate.resolve_route("/v1/hero").await.expect("route");
        assert!(gate.store_live(live("/v1/hero", None, Some(&route))).await);

        assert!(!gate.lookup("/v1/hero", "de", None).await.is_served());
    }

    #[tokio::test]
    async fn backend_failures_fall_through() {
        let (gate, _) = gate_over(Arc::new(FailingBackend));
        let route = gate.resolve_route("/v1/hero").await.expect("route");

        assert_eq!(
            gate.lookup("/v1/hero", "en", Some(EDITOR_TOKEN)).await,
            GateDecision::Fallthrough(FallthroughReason::Miss)
        );
        assert!(!gate.store_live(live("/v1/hero", None, Some(&route))).await);
    }

    #[test]
    fn path_of_strips_query() {
        assert_eq!(path_of("/v1/hero?lang=en"), "/v1/hero");
        assert_eq!(path_of("/v1/hero"), "/v1/hero");
    }

    #[test]
    fn refresh_timestamp_updates_objects_only() {
        let now = OffsetDateTime::from_unix_timestamp(1_700_000_000).expect("timestamp");

        let refreshed = refresh_timestamp(&Bytes::from_static(br#"{"timestamp":1,"data":[1]}"#), now);
        let value: Value = serde_json::from_slice(&refreshed).expect("json");
        assert_eq!(value["timestamp"], 1_700_000_000);
        assert_eq!(value["data"][0], 1);

        let opaque = Bytes::from_static(b"<html></html>");
        assert_eq!(refresh_timestamp(&opaque, now), opaque);

        let array = Bytes::from_static(b"[1,2]");
        assert_eq!(refresh_timestamp(&array, now), array);
    }

    #[test]
    fn fallthrough_reasons_have_stable_labels() {
        assert_eq!(FallthroughReason::Miss.as_str(), "miss");
        assert_eq!(FallthroughReason::RequirementsUnmet.as_str(), "requirements_unmet");
    }
}
