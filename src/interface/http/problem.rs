use axum::Json;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// Error body returned by every job endpoint (`application/problem+json`).
#[derive(Debug, Serialize)]
pub struct ProblemDetails {
    /// Always `about:blank`; callers branch on `code`.
    #[serde(rename = "type")]
    pub r#type: String,
    pub title: String,
    pub status: u16,
    /// What was wrong with the submission or lookup.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,
    /// One of the `INF_*` constants below.
    pub code: String,
    /// Echo of the request's trace id, for matching against server logs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
}

/// Render a job API error with its `INF_*` code and trace id.
pub fn problem(
    status: StatusCode,
    code: &str,
    detail: Option<String>,
    instance: Option<String>,
    trace_id: Option<String>,
) -> Response {
    // Step 1: Title comes from the status; the code carries the meaning.
    let payload = ProblemDetails {
        r#type: "about:blank".to_string(),
        title: status.canonical_reason().unwrap_or("Error").to_string(),
        status: status.as_u16(),
        detail,
        instance,
        code: code.to_string(),
        trace_id,
    };

    // Step 2: Convert to an HTTP response with JSON body.
    let mut response = (status, Json(payload)).into_response();

    // Step 3: Replace the JSON content type with problem+json.
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/problem+json"),
    );

    response
}

pub const INF_REQUEST_MALFORMED: &str = "INF_REQUEST_MALFORMED";
pub const INF_JOB_VALIDATION_FAILED: &str = "INF_JOB_VALIDATION_FAILED";
pub const INF_JOB_NOT_FOUND: &str = "INF_JOB_NOT_FOUND";
pub const INF_JOB_ALREADY_TERMINAL: &str = "INF_JOB_ALREADY_TERMINAL";
pub const INF_STORAGE_UNAVAILABLE: &str = "INF_STORAGE_UNAVAILABLE";
