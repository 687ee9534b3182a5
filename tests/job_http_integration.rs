use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use inferd::application::context::AppContext;
use inferd::config::Settings;
use inferd::domain::runners::RunnerRegistryBuilder;
use inferd::domain::runners::builtin::register_builtin;
use inferd::infrastructure::db::repositories::Repositories;
use inferd::infrastructure::notify::DisabledNotifier;
use inferd::infrastructure::storage::MemoryStorage;
use inferd::interface::http;
use inferd::interface::http::state::AppState;
use serde_json::{Value, json};
use std::sync::Arc;
use tower::util::ServiceExt;

fn setup_state() -> AppState {
    let settings = Settings::default();
    let mut registry = RunnerRegistryBuilder::new();
    register_builtin(&mut registry).unwrap();
    let ctx = AppContext::new(
        Repositories::memory(),
        registry.build(),
        Arc::new(MemoryStorage::new()),
        Arc::new(DisabledNotifier),
        &settings,
    );
    AppState {
        ctx: Arc::new(ctx),
        settings,
        metrics: None,
    }
}

async fn response_json(response: axum::response::Response) -> Value {
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&body).unwrap_or(Value::Null)
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn empty_request(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

fn raster_job() -> Value {
    json!({
        "job_type": "superres-x4",
        "payload": {"width": 2, "height": 1, "pixels_hex": "00ff"},
        "priority": "high"
    })
}

#[tokio::test]
async fn given_valid_request_when_submit_and_get_should_return_pending_job() {
    let state = setup_state();

    let submit = http::app(state.clone())
        .oneshot(json_request("POST", "/v1/jobs", raster_job()))
        .await
        .unwrap();
    assert_eq!(submit.status(), StatusCode::ACCEPTED);
    let submitted = response_json(submit).await;
    assert_eq!(submitted["state"], "pending");
    assert_eq!(submitted["priority"], "high");
    assert_eq!(submitted["deduplicated"], false);
    let job_id = submitted["job_id"].as_str().unwrap().to_string();

    let get = http::app(state)
        .oneshot(empty_request("GET", &format!("/v1/jobs/{job_id}")))
        .await
        .unwrap();
    assert_eq!(get.status(), StatusCode::OK);
    let view = response_json(get).await;
    assert_eq!(view["job_id"], job_id.as_str());
    assert_eq!(view["job_type"], "superres-x4");
    assert_eq!(view["attempts"], 0);
    assert!(view.get("result").is_none());
}

#[tokio::test]
async fn given_duplicate_submission_when_submit_should_return_existing_job_with_200() {
    let state = setup_state();

    let first = response_json(
        http::app(state.clone())
            .oneshot(json_request("POST", "/v1/jobs", raster_job()))
            .await
            .unwrap(),
    )
    .await;
    let second = http::app(state)
        .oneshot(json_request("POST", "/v1/jobs", raster_job()))
        .await
        .unwrap();

    assert_eq!(second.status(), StatusCode::OK);
    let second = response_json(second).await;
    assert_eq!(second["job_id"], first["job_id"]);
    assert_eq!(second["deduplicated"], true);
}

#[tokio::test]
async fn given_malformed_body_when_submit_should_return_problem() {
    let state = setup_state();

    let response = http::app(state)
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/jobs")
                .header("content-type", "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        response.headers()["content-type"],
        "application/problem+json"
    );
    let problem = response_json(response).await;
    assert_eq!(problem["code"], "INF_REQUEST_MALFORMED");
    assert!(problem["trace_id"].as_str().is_some());
}

#[tokio::test]
async fn given_invalid_fields_when_submit_should_return_validation_problem() {
    let state = setup_state();

    for body in [
        json!({"job_type": "", "payload": {}}),
        json!({"job_type": "superres x4", "payload": {}}),
        json!({"job_type": "superres-x4", "payload": {}, "priority": "urgent"}),
    ] {
        let response = http::app(state.clone())
            .oneshot(json_request("POST", "/v1/jobs", body.clone()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "body {body}");
        assert_eq!(
            response_json(response).await["code"],
            "INF_JOB_VALIDATION_FAILED"
        );
    }
}

#[tokio::test]
async fn given_unknown_job_type_when_submit_should_accept_and_report_failed() {
    let state = setup_state();

    let response = http::app(state)
        .oneshot(json_request(
            "POST",
            "/v1/jobs",
            json!({"job_type": "deblur-v9", "payload": {}}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert_eq!(response_json(response).await["state"], "failed");
}

#[tokio::test]
async fn given_unknown_or_bad_job_id_when_get_should_return_problems() {
    let state = setup_state();

    let missing = http::app(state.clone())
        .oneshot(empty_request(
            "GET",
            &format!("/v1/jobs/{}", uuid::Uuid::new_v4()),
        ))
        .await
        .unwrap();
    let malformed = http::app(state)
        .oneshot(empty_request("GET", "/v1/jobs/not-a-uuid"))
        .await
        .unwrap();

    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    assert_eq!(response_json(missing).await["code"], "INF_JOB_NOT_FOUND");
    assert_eq!(malformed.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn given_pending_job_when_canceled_twice_should_conflict_on_second_call() {
    let state = setup_state();
    let submitted = response_json(
        http::app(state.clone())
            .oneshot(json_request("POST", "/v1/jobs", raster_job()))
            .await
            .unwrap(),
    )
    .await;
    let cancel_uri = format!("/v1/jobs/{}/cancel", submitted["job_id"].as_str().unwrap());

    let first = http::app(state.clone())
        .oneshot(empty_request("POST", &cancel_uri))
        .await
        .unwrap();
    let second = http::app(state.clone())
        .oneshot(empty_request("POST", &cancel_uri))
        .await
        .unwrap();

    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(response_json(first).await["state"], "canceled");
    assert_eq!(second.status(), StatusCode::CONFLICT);
    assert_eq!(
        response_json(second).await["code"],
        "INF_JOB_ALREADY_TERMINAL"
    );
    assert!(state.ctx.queue.is_empty());
}

#[tokio::test]
async fn given_request_id_header_when_called_should_echo_it() {
    let state = setup_state();

    let response = http::app(state)
        .oneshot(
            Request::builder()
                .uri("/health")
                .header("x-request-id", "req-123")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.headers()["x-request-id"], "req-123");
}

#[tokio::test]
async fn given_memory_backend_when_health_should_report_ok_with_job_types() {
    let state = setup_state();

    let response = http::app(state)
        .oneshot(empty_request("GET", "/health"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["backend"], "memory");
    assert_eq!(body["job_types"], json!(["image-scoring-v1", "superres-x4"]));
    assert_eq!(body["queue"]["high"], 0);
}

#[tokio::test]
async fn given_no_recorder_when_metrics_should_be_unavailable() {
    let state = setup_state();

    let response = http::app(state)
        .oneshot(empty_request("GET", "/metrics"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn given_prometheus_handle_when_metrics_should_render_text() {
    let mut state = setup_state();
    let recorder = metrics_exporter_prometheus::PrometheusBuilder::new().build_recorder();
    state.metrics = Some(recorder.handle());

    let response = http::app(state)
        .oneshot(empty_request("GET", "/metrics"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        response.headers()["content-type"]
            .to_str()
            .unwrap()
            .starts_with("text/plain")
    );
}
