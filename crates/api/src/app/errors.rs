use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use officedesk_infra::workflows::WorkflowError;

pub fn workflow_error_to_response(err: WorkflowError) -> axum::response::Response {
    match err {
        WorkflowError::ReportNotFound(_) | WorkflowError::TaskNotFound { .. } | WorkflowError::UnknownTask(_) => {
            json_error(StatusCode::NOT_FOUND, "not_found", err.to_string())
        }
        WorkflowError::Conflict(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
        WorkflowError::Schedule(msg) => json_error(StatusCode::SERVICE_UNAVAILABLE, "schedule_error", msg),
        WorkflowError::Window(e) => json_error(StatusCode::INTERNAL_SERVER_ERROR, "invalid_window", e.to_string()),
        WorkflowError::Store(e) => json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", e.to_string()),
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
