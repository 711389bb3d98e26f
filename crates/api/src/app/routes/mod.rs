use axum::{routing::post, Router};

pub mod schedule;
pub mod system;

/// Router for the key-guarded schedule trigger endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/schedule/check_daily_report", post(schedule::check_daily_report))
        .route("/schedule/daily_generation", post(schedule::daily_generation))
}
