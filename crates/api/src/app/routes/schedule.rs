//! Manual triggers for the two nightly jobs.
//!
//! Both only enqueue work; the pool does the completion calls.

use std::sync::Arc;

use axum::{
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use officedesk_infra::Services;

use crate::app::errors::{json_error, workflow_error_to_response};

pub async fn check_daily_report(Extension(services): Extension<Arc<Services>>) -> Response {
    match tokio::task::spawn_blocking(move || services.run_reconciliation_sweep()).await {
        Ok(Ok(report)) => (StatusCode::OK, Json(report)).into_response(),
        Ok(Err(e)) => workflow_error_to_response(e),
        Err(e) => json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", e.to_string()),
    }
}

pub async fn daily_generation(Extension(services): Extension<Arc<Services>>) -> Response {
    match tokio::task::spawn_blocking(move || services.run_daily_task_generation()).await {
        Ok(Ok(scheduled)) => (StatusCode::OK, Json(json!({ "scheduled": scheduled }))).into_response(),
        Ok(Err(e)) => workflow_error_to_response(e),
        Err(e) => json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", e.to_string()),
    }
}
