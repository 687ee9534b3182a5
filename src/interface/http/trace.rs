use axum::extract::MatchedPath;
use axum::http::{HeaderName, HeaderValue, Request};
use axum::middleware::Next;
use axum::response::Response;
use metrics::{counter, histogram};
use tracing::info;

const REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// A per-request trace identifier used for support and debugging.
#[derive(Debug, Clone)]
pub struct TraceId(pub String);

/// Injects a trace id into request extensions and response headers.
pub async fn trace_id_middleware(mut req: Request<axum::body::Body>, next: Next) -> Response {
    // Step 1: Reuse a client-provided id or generate a new one.
    let trace_id = req
        .headers()
        .get(&REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty() && v.len() <= 128)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let trace_id = TraceId(trace_id);
    req.extensions_mut().insert(trace_id.clone());

    // Step 2: Run the request and echo the id back.
    let mut response = next.run(req).await;
    if let Ok(value) = HeaderValue::from_str(&trace_id.0) {
        response.headers_mut().insert(REQUEST_ID, value);
    }

    response
}

fn status_class(status: u16) -> &'static str {
    match status {
        100..=199 => "1xx",
        200..=299 => "2xx",
        300..=399 => "3xx",
        400..=499 => "4xx",
        500..=599 => "5xx",
        _ => "other",
    }
}

/// Emits a structured request log with the trace id, route, status, and latency.
pub async fn request_log_middleware(req: Request<axum::body::Body>, next: Next) -> Response {
    // Step 1: Capture request metadata and start the timer.
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    // Route templates keep the label set bounded.
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());
    let trace_id = req.extensions().get::<TraceId>().map(|t| t.0.clone());
    let start = std::time::Instant::now();

    // Step 2: Run the request.
    let response = next.run(req).await;

    // Step 3: Record metrics and emit a structured log entry.
    let latency_ms = start.elapsed().as_secs_f64() * 1_000.0;
    let status = response.status().as_u16();
    let class = status_class(status);
    counter!(
        "http_requests_total",
        "method" => method.to_string(),
        "route" => route.clone(),
        "status" => class
    )
    .increment(1);
    histogram!("http_request_duration_ms", "route" => route.clone()).record(latency_ms);
    info!(
        trace_id = trace_id.as_deref().unwrap_or(""),
        method = %method,
        path = %path,
        route = %route,
        status,
        latency_ms,
        "http_request"
    );

    response
}
