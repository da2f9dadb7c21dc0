use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};
use log::{error, info};
use serde_json::{Value, json};

use crate::config::SchedulerConfig;
use crate::data::{ErrorBody, SchedulingRequest, SolveResult};
use crate::error::SchedulerError;
use crate::solver;

/// Environment variable holding the bind address.
pub const ADDR_ENV: &str = "COURSE_TIMETABLER_ADDR";
pub const DEFAULT_ADDR: &str = "127.0.0.1:8080";

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<SchedulerConfig>,
}

type ErrorResponse = (StatusCode, Json<ErrorBody>);

fn error_response(status: StatusCode, error: String, detail: String) -> ErrorResponse {
    (
        status,
        Json(ErrorBody {
            success: false,
            error,
            detail,
        }),
    )
}

impl From<SchedulerError> for ErrorResponse {
    fn from(e: SchedulerError) -> Self {
        error_response(StatusCode::BAD_REQUEST, e.kind().to_string(), e.to_string())
    }
}

fn solve_payload(body: &[u8], config: &SchedulerConfig) -> Result<SolveResult, SchedulerError> {
    let request: SchedulingRequest = serde_json::from_slice(body)?;
    solver::solve(&request, config)
}

async fn solve_handler(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<SolveResult>, ErrorResponse> {
    let config = Arc::clone(&state.config);
    let joined = tokio::task::spawn_blocking(move || solve_payload(&body, &config)).await;

    match joined {
        Ok(Ok(result)) => Ok(Json(result)),
        Ok(Err(e)) => {
            error!("Rejected scheduling request: {e}");
            Err(e.into())
        }
        Err(e) => {
            error!("Solver task failed: {e}");
            Err(error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "InternalError".to_string(),
                e.to_string(),
            ))
        }
    }
}

async fn health_handler() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub fn router(config: SchedulerConfig) -> Router {
    let state = AppState {
        config: Arc::new(config),
    };
    Router::new()
        .route("/v1/schedule/solve", post(solve_handler))
        .route("/v1/health", get(health_handler))
        .with_state(state)
}

pub async fn run_server(config: SchedulerConfig, addr: SocketAddr) -> std::io::Result<()> {
    let app = router(config);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!("Server running at http://{}", listener.local_addr()?);

    axum::serve(listener, app).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use tower::ServiceExt;

    async fn call(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let request = Request::builder().uri("/v1/health").body(Body::empty()).unwrap();
        let (status, body) = call(router(SchedulerConfig::default()), request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn malformed_payload_is_an_error_object() {
        let request = Request::builder()
            .method("POST")
            .uri("/v1/schedule/solve")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"scheduleId": "S1"}"#))
            .unwrap();
        let (status, body) = call(router(SchedulerConfig::default()), request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "ConfigurationError");
        assert!(body["detail"].as_str().unwrap().contains("courses"));
    }

    #[tokio::test]
    async fn solves_an_empty_week() {
        let payload = json!({
            "scheduleId": "S1",
            "courses": [],
            "professors": [],
            "timeSlots": [],
            "professorAvailability": []
        });
        let request = Request::builder()
            .method("POST")
            .uri("/v1/schedule/solve")
            .body(Body::from(payload.to_string()))
            .unwrap();
        let (status, body) = call(router(SchedulerConfig::default()), request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["schedule_id"], "S1");
        assert_eq!(body["status"], "OPTIMAL");
        assert_eq!(body["scheduled_courses"].as_array().unwrap().len(), 0);
    }
}
