//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `routes/`: HTTP routes + handlers
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{routing::get, Extension, Router};

use officedesk_infra::Services;

use crate::middleware::{self, ScheduleAuth};

pub mod errors;
pub mod routes;

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub fn build_app(services: Arc<Services>) -> Router {
    let auth = ScheduleAuth::new(services.config().schedule_key.clone());

    // Trigger routes: require the schedule key.
    let triggers = routes::router()
        .layer(Extension(services))
        .layer(axum::middleware::from_fn_with_state(
            auth,
            middleware::schedule_key_middleware,
        ));

    Router::new()
        .route("/health", get(routes::system::health))
        .merge(triggers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use officedesk_ai::ScriptedCompletionService;
    use officedesk_infra::ServiceConfig;
    use tower::ServiceExt;

    fn services(key: Option<&str>) -> Arc<Services> {
        let config = ServiceConfig {
            schedule_key: key.map(str::to_string),
            ..ServiceConfig::default()
        };
        Arc::new(Services::start(config, Arc::new(ScriptedCompletionService::new())).unwrap())
    }

    async fn status(app: Router, req: Request<Body>) -> StatusCode {
        app.oneshot(req).await.unwrap().status()
    }

    #[tokio::test]
    async fn health_needs_no_key() {
        let svc = services(None);
        let req = Request::get("/health").body(Body::empty()).unwrap();
        assert_eq!(status(build_app(svc.clone()), req).await, StatusCode::OK);
        svc.shutdown();
    }

    #[tokio::test]
    async fn triggers_are_rejected_when_no_key_is_configured() {
        let svc = services(None);
        let req = Request::post("/schedule/daily_generation")
            .header("key", "anything")
            .body(Body::empty())
            .unwrap();
        assert_eq!(status(build_app(svc.clone()), req).await, StatusCode::UNAUTHORIZED);
        svc.shutdown();
    }

    #[tokio::test]
    async fn matching_key_runs_the_trigger() {
        let svc = services(Some("s3cret"));
        let req = Request::post("/schedule/daily_generation")
            .header("key", "s3cret")
            .body(Body::empty())
            .unwrap();
        assert_eq!(status(build_app(svc.clone()), req).await, StatusCode::OK);
        svc.shutdown();
    }
}
