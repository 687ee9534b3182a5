use crate::infrastructure::queue::QueueDepths;
use crate::interface::http::state::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::{Json, Router, routing::get};
use serde::Serialize;

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    backend: &'static str,
    queue: QueueDepths,
    job_types: Vec<String>,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health))
}

/// Reports `ok` while the job store answers, `degraded` with 503 otherwise.
async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let ctx = &state.ctx;
    let (status, code) = match ctx.repos.db.ping().await {
        Ok(()) => ("ok", StatusCode::OK),
        Err(e) => {
            tracing::warn!(error = %e, "health_ping_failed");
            ("degraded", StatusCode::SERVICE_UNAVAILABLE)
        }
    };

    let body = HealthResponse {
        status,
        backend: ctx.repos.db.backend(),
        queue: ctx.queue.depths(),
        job_types: ctx
            .registry
            .job_types()
            .into_iter()
            .map(str::to_string)
            .collect(),
    };
    (code, Json(body))
}
