pub mod dto;
pub mod problem;
pub mod routes;
pub mod state;
pub mod trace;

use crate::interface::http::state::AppState;
use axum::Router;
use axum::middleware;

/// Assemble every route with the request tracing layers.
pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(routes::health::router())
        .merge(routes::job::router())
        .merge(routes::metrics::router())
        .layer(middleware::from_fn(trace::request_log_middleware))
        .layer(middleware::from_fn(trace::trace_id_middleware))
        .with_state(state)
}
