use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use tracing::warn;

use crate::cache::CacheError;

#[derive(Debug, Serialize)]
pub struct AdminErrorBody {
    pub error: AdminErrorMessage,
}

pub mod codes {
    pub const BAD_REQUEST: &str = "bad_request";
    pub const CACHE_UNAVAILABLE: &str = "cache_unavailable";
}

#[derive(Debug, Serialize)]
pub struct AdminErrorMessage {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

#[derive(Debug)]
pub struct AdminError {
    status: StatusCode,
    code: &'static str,
    message: &'static str,
    hint: Option<String>,
}

impl AdminError {
    pub fn new(
        status: StatusCode,
        code: &'static str,
        message: &'static str,
        hint: Option<String>,
    ) -> Self {
        Self {
            status,
            code,
            message,
            hint,
        }
    }

    pub fn bad_request(message: &'static str, hint: Option<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, codes::BAD_REQUEST, message, hint)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<CacheError> for AdminError {
    fn from(err: CacheError) -> Self {
        warn!(error = %err, "cache admin operation failed");
        Self::new(
            StatusCode::SERVICE_UNAVAILABLE,
            codes::CACHE_UNAVAILABLE,
            "Cache backend unavailable",
            Some(err.to_string()),
        )
    }
}

impl IntoResponse for AdminError {
    fn into_response(self) -> Response {
        let body = AdminErrorBody {
            error: AdminErrorMessage {
                code: self.code.to_string(),
                message: self.message.to_string(),
                hint: self.hint,
            },
        };
        (self.status, Json(body)).into_response()
    }
}
