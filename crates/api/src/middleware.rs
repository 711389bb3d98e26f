use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};

use crate::app::errors::json_error;

/// Header carrying the shared schedule key.
pub const SCHEDULE_KEY_HEADER: &str = "key";

#[derive(Clone)]
pub struct ScheduleAuth {
    /// `None` rejects every trigger request.
    pub key: Option<Arc<str>>,
}

impl ScheduleAuth {
    pub fn new(key: Option<String>) -> Self {
        Self {
            key: key.map(Arc::from),
        }
    }
}

/// Guard for the schedule trigger routes: the `key` header must equal the configured key.
pub async fn schedule_key_middleware(
    State(auth): State<ScheduleAuth>,
    req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, Response> {
    let Some(expected) = auth.key.as_deref() else {
        tracing::warn!(path = %req.uri().path(), "schedule trigger rejected: no key configured");
        return Err(unauthorized());
    };

    match extract_key(req.headers()) {
        Some(given) if given == expected => Ok(next.run(req).await),
        _ => {
            tracing::warn!(path = %req.uri().path(), "schedule trigger rejected: bad key");
            Err(unauthorized())
        }
    }
}

fn extract_key(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(SCHEDULE_KEY_HEADER)?.to_str().ok()?.trim();
    if value.is_empty() {
        return None;
    }
    Some(value)
}

fn unauthorized() -> Response {
    json_error(StatusCode::UNAUTHORIZED, "unauthorized", "missing or invalid schedule key")
}
