//! Admin endpoints for cache invalidation.

pub mod error;

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
};
use serde::{Deserialize, Serialize};

use crate::cache::{EntityRef, InvalidationTrigger};

use self::error::AdminError;

#[derive(Clone)]
pub struct AdminState {
    pub trigger: Arc<InvalidationTrigger>,
}

#[derive(Debug, Deserialize)]
pub struct InvalidateTagsRequest {
    pub tags: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct InvalidateEntityRequest {
    pub kind: String,
    pub id: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct InvalidateResponse {
    pub invalidated: usize,
}

pub fn admin_router(trigger: Arc<InvalidationTrigger>) -> Router {
    Router::new()
        .route("/cache/invalidate", post(invalidate_tags))
        .route("/cache/invalidate/entity", post(invalidate_entity))
        .route("/cache/flush", post(flush_cache))
        .with_state(AdminState { trigger })
}

async fn invalidate_tags(
    State(state): State<AdminState>,
    Json(request): Json<InvalidateTagsRequest>,
) -> Result<Json<InvalidateResponse>, AdminError> {
    let tags: Vec<String> = request
        .tags
        .into_iter()
        .map(|tag| tag.trim().to_string())
        .filter(|tag| !tag.is_empty())
        .collect();
    if tags.is_empty() {
        return Err(AdminError::bad_request("At least one tag is required", None));
    }

    let invalidated = state.trigger.invalidate_tags(&tags).await?;
    Ok(Json(InvalidateResponse { invalidated }))
}

async fn invalidate_entity(
    State(state): State<AdminState>,
    Json(request): Json<InvalidateEntityRequest>,
) -> Result<Json<InvalidateResponse>, AdminError> {
    let kind = request.kind.trim();
    let id = request.id.trim();
    if kind.is_empty() || id.is_empty() {
        return Err(AdminError::bad_request(
            "Entity kind and id are required",
            Some(format!("kind={kind:?} id={id:?}")),
        ));
    }

    let entity = EntityRef::new(kind, id).with_dependency_tags(request.tags);
    let invalidated = state.trigger.content_changed(entity).await?;
    Ok(Json(InvalidateResponse { invalidated }))
}

async fn flush_cache(State(state): State<AdminState>) -> Result<Response, AdminError> {
    state.trigger.flush_all().await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}
