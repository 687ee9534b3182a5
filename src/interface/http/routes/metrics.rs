use crate::interface::http::state::AppState;
use axum::Router;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use metrics::gauge;

/// Builds the metrics route.
pub fn router() -> Router<AppState> {
    Router::new().route("/metrics", get(metrics))
}

/// Prometheus text exposition; 503 when no recorder was installed.
async fn metrics(State(state): State<AppState>) -> Response {
    let Some(handle) = state.metrics.as_ref() else {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    };

    // Point-in-time gauges, sampled per scrape.
    state.ctx.queue.publish_gauges();
    gauge!("runner_job_types").set(state.ctx.registry.job_types().len() as f64);
    gauge!("worker_slots").set(state.settings.workers.slots.len() as f64);

    let body = handle.render();
    ([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body).into_response()
}
