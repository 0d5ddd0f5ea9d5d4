//! Response cache middleware.
//!
//! Serves GET requests from the cache when the gate allows it, otherwise runs
//! the handler, stamps miss headers and offers the result to the cache.

use std::sync::Arc;

use axum::{
    body::{Body, HttpBody},
    extract::State,
    http::{HeaderMap, HeaderName, HeaderValue, Method, Request, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use time::OffsetDateTime;
use tracing::{debug, instrument, warn};

use super::{
    deps,
    gate::{CachedResponse, GateDecision, LiveResponse, ResponseCacheGate},
    headers::CacheDisposition,
};

/// Shared cache state for the middleware.
#[derive(Clone)]
pub struct CacheState {
    pub gate: Arc<ResponseCacheGate>,
}

impl CacheState {
    pub fn new(gate: Arc<ResponseCacheGate>) -> Self {
        Self { gate }
    }
}

/// Middleware for response caching.
///
/// Every live response gets miss headers. Successful GET responses of
/// cacheable routes are stored together with the tags the handler declared
/// through [`deps::record`].
#[instrument(skip_all, fields(path = %request.uri().path()))]
pub async fn response_cache_layer(
    State(cache): State<CacheState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let gate = &cache.gate;
    let config = gate.config();
    if !config.enabled {
        return next.run(request).await;
    }

    let uri = request
        .uri()
        .path_and_query()
        .map(|value| value.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());
    let token = extract_bearer(request.headers());
    let language = config.normalize_language(
        request
            .headers()
            .get(header::ACCEPT_LANGUAGE)
            .and_then(|value| value.to_str().ok()),
    );
    let is_get = request.method() == Method::GET;

    if is_get {
        match gate.lookup(&uri, &language, token.as_deref()).await {
            GateDecision::Serve(cached) => {
                debug!(cache = "response", outcome = "hit", "serving cached response");
                return build_response(cached);
            }
            GateDecision::Fallthrough(reason) => {
                debug!(
                    cache = "response",
                    outcome = "fallthrough",
                    reason = reason.as_str(),
                    "executing handler"
                );
            }
        }
    }

    let route = gate.resolve_route(&uri).await;
    let cacheable = route.as_ref().is_some_and(|route| route.cacheable);

    let (mut response, declared_tags) = deps::with_collector(next.run(request)).await;

    let disposition = if cacheable {
        CacheDisposition::Miss
    } else {
        CacheDisposition::NotCacheable
    };
    disposition.apply_to_map(response.headers_mut(), OffsetDateTime::now_utc());

    if !is_get || !cacheable || response.status().as_u16() >= 400 {
        return response;
    }

    let within_limit = response
        .body()
        .size_hint()
        .upper()
        .is_some_and(|upper| upper <= config.max_body_bytes as u64);
    if !within_limit {
        debug!(cache = "response", "body size unknown or too large, not caching");
        return response;
    }

    let (parts, body) = response.into_parts();
    let bytes = match axum::body::to_bytes(body, config.max_body_bytes).await {
        Ok(bytes) => bytes,
        Err(error) => {
            warn!(cache = "response", error = %error, "failed to collect response body");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let stored = gate
        .store_live(LiveResponse {
            is_get,
            uri: &uri,
            language: &language,
            token: token.as_deref(),
            route: route.as_ref(),
            status: parts.status.as_u16(),
            headers: header_list(&parts.headers),
            body: bytes.clone(),
            declared_tags,
        })
        .await;
    debug!(cache = "response", stored, "offered live response");

    Response::from_parts(parts, Body::from(bytes))
}

/// Token from an `Authorization: Bearer <token>` header.
///
/// The scheme must be followed by whitespace and a single token without
/// inner whitespace; anything else counts as no token.
pub fn extract_bearer(headers: &HeaderMap) -> Option<String> {
    let raw = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let rest = raw.strip_prefix("Bearer")?;
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }

    let token = rest.trim_start();
    if token.is_empty() || token.contains(char::is_whitespace) {
        return None;
    }
    Some(token.to_string())
}

/// Per-caller and per-connection headers never replayed from the cache.
const UNCACHED_HEADERS: [HeaderName; 9] = [
    header::SET_COOKIE,
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

fn header_list(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .filter(|(name, _)| !UNCACHED_HEADERS.contains(*name))
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|value| (name.to_string(), value.to_string()))
        })
        .collect()
}

/// Build a response from cached data.
fn build_response(cached: CachedResponse) -> Response {
    let mut builder = Response::builder().status(cached.status);

    for (name, value) in cached.headers {
        if let Ok(header_value) = HeaderValue::from_str(&value) {
            builder = builder.header(name, header_value);
        }
    }

    builder
        .body(Body::from(cached.body))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}
