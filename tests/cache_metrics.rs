use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header},
    middleware,
    routing::get,
};
use bytes::Bytes;
use metrics_util::debugging::DebuggingRecorder;
use tagcache::access::{
    IdentityProvider, RoutePolicy, RouteTable, Subject, TokenCheck, TokenIdentity,
};
use tagcache::cache::{
    CacheBackend, CacheConfig, CacheServices, CacheWrite, EntityRef, MemoryBackend, deps,
    response_cache_layer,
};
use tagcache::infra::telemetry;
use tower::ServiceExt;

/// Every token is rejected.
struct Rejecting;

#[async_trait]
impl IdentityProvider for Rejecting {
    async fn verify_token(&self, _token: &str) -> TokenCheck {
        TokenCheck {
            expired: true,
            ..TokenCheck::valid()
        }
    }

    async fn identity_from_token(&self, _token: &str) -> Option<TokenIdentity> {
        None
    }

    async fn load_subject(&self, _token: &str) -> Option<Subject> {
        None
    }
}

#[tokio::test]
async fn cache_paths_emit_expected_metric_keys() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .expect("debug metrics recorder should install in this test process");
    telemetry::describe_metrics();

    // Capacity one so the second page evicts the first.
    let records: Arc<dyn CacheBackend> = Arc::new(MemoryBackend::new("records", NonZeroUsize::MIN));
    let tags: Arc<dyn CacheBackend> = Arc::new(MemoryBackend::unbounded("tags"));
    let routes = RouteTable::new()
        .with_route(
            "pages/{slug}",
            RoutePolicy {
                cacheable: true,
                ..Default::default()
            },
        )
        .with_route(
            "members/{slug}",
            RoutePolicy {
                roles: ["member".to_string()].into(),
                cacheable: true,
                ..Default::default()
            },
        );
    let services = CacheServices::with_backends(
        CacheConfig::default(),
        records,
        tags,
        Arc::new(routes),
        Arc::new(Rejecting),
    );

    let app = Router::new()
        .route(
            "/pages/{slug}",
            get(|| async {
                deps::record("node:1");
                StatusCode::OK
            }),
        )
        .route("/members/{slug}", get(|| async { StatusCode::OK }))
        .layer(middleware::from_fn_with_state(
            services.state(),
            response_cache_layer,
        ));

    // A plain entry for a protected route: token holders are re-checked.
    let gate = &services.gate;
    assert!(
        gate.create(CacheWrite {
            key: gate.key_for("/members/one", "en", None),
            payload: Bytes::from_static(b"{}"),
            status: 200,
            headers: Vec::new(),
            tags: Vec::new(),
            language: "en".to_string(),
        })
        .await
    );

    let requests = [
        ("/members/one", Some("Bearer a")),
        ("/pages/one", None),
        ("/pages/one", None),
        ("/pages/two", None),
    ];
    for (uri, authorization) in requests {
        let mut request = Request::builder().method(Method::GET).uri(uri);
        if let Some(authorization) = authorization {
            request = request.header(header::AUTHORIZATION, authorization);
        }
        let response = app
            .clone()
            .oneshot(request.body(Body::empty()).expect("request should build"))
            .await
            .expect("router should respond");
        assert_eq!(response.status(), StatusCode::OK);
    }

    services
        .trigger
        .content_changed(EntityRef::new("node", "1"))
        .await
        .expect("invalidate");

    let names: HashSet<String> = snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .map(|(composite_key, _, _, _)| composite_key.key().name().to_string())
        .collect();

    let expected = [
        "tagcache_gate_hit_total",
        "tagcache_gate_miss_total",
        "tagcache_gate_denied_total",
        "tagcache_backend_evict_total",
        "tagcache_invalidated_keys_total",
        "tagcache_invalidate_ms",
    ];

    for metric in expected {
        assert!(names.contains(metric), "missing metric: {metric}");
    }
}
