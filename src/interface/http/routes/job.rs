// HTTP routes: submit/cancel/get jobs.

use crate::application::usecases::cancel_job::{CancelJobError, CancelJobUseCase};
use crate::application::usecases::get_job::{GetJobError, GetJobUseCase, JobStatusView};
use crate::application::usecases::submit_job::{SubmitJobError, SubmitJobUseCase};
use crate::domain::value_objects::ids::JobId;
use crate::interface::http::dto::job::{JobStateResponse, SubmitJobRequest, SubmitJobResponse};
use crate::interface::http::problem::{
    INF_JOB_ALREADY_TERMINAL, INF_JOB_NOT_FOUND, INF_JOB_VALIDATION_FAILED,
    INF_REQUEST_MALFORMED, INF_STORAGE_UNAVAILABLE, problem,
};
use crate::interface::http::state::AppState;
use crate::interface::http::trace::TraceId;
use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Extension, Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};

/// Builds job lifecycle routes.
pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route("/v1/jobs", post(submit_job))
        .route("/v1/jobs/:job_id", get(get_job))
        .route("/v1/jobs/:job_id/cancel", post(cancel_job))
}

fn parse_job_id(raw: &str, trace_id: &Option<String>) -> Result<JobId, Response> {
    raw.parse::<JobId>().map_err(|_| {
        problem(
            StatusCode::BAD_REQUEST,
            INF_REQUEST_MALFORMED,
            Some("invalid job_id".to_string()),
            None,
            trace_id.clone(),
        )
    })
}

/// Submits a job; 202 for a new job, 200 when it resolves to an existing one.
async fn submit_job(
    State(state): State<AppState>,
    Extension(trace_id): Extension<TraceId>,
    body: Result<Json<SubmitJobRequest>, JsonRejection>,
) -> Response {
    let trace_id = Some(trace_id.0);

    // Step 1: Parse the body.
    let request = match body {
        Ok(Json(request)) => request,
        Err(rejection) => {
            return problem(
                StatusCode::BAD_REQUEST,
                INF_REQUEST_MALFORMED,
                Some(rejection.body_text()),
                None,
                trace_id,
            );
        }
    };

    // Step 2: Map the body onto a job spec.
    let spec = match request.into_spec() {
        Ok(spec) => spec,
        Err(detail) => {
            return problem(
                StatusCode::BAD_REQUEST,
                INF_JOB_VALIDATION_FAILED,
                Some(detail),
                None,
                trace_id,
            );
        }
    };

    // Step 3: Execute the submit use case and map the output.
    match SubmitJobUseCase::execute(&state.ctx, spec).await {
        Ok(admission) => {
            let status = if admission.deduplicated {
                StatusCode::OK
            } else {
                StatusCode::ACCEPTED
            };
            let response = SubmitJobResponse::new(&admission.job, admission.deduplicated);
            (status, Json(response)).into_response()
        }
        Err(SubmitJobError::Invalid(err)) => problem(
            StatusCode::BAD_REQUEST,
            INF_JOB_VALIDATION_FAILED,
            Some(err.message()),
            None,
            trace_id,
        ),
        Err(SubmitJobError::Storage(_)) => problem(
            StatusCode::SERVICE_UNAVAILABLE,
            INF_STORAGE_UNAVAILABLE,
            Some("storage unavailable".to_string()),
            None,
            trace_id,
        ),
    }
}

/// Fetches a job's status view.
async fn get_job(
    State(state): State<AppState>,
    Extension(trace_id): Extension<TraceId>,
    Path(job_id): Path<String>,
) -> Response {
    let trace_id = Some(trace_id.0);
    let job_id = match parse_job_id(&job_id, &trace_id) {
        Ok(id) => id,
        Err(response) => return response,
    };

    match GetJobUseCase::execute(&state.ctx, job_id).await {
        Ok(job) => (StatusCode::OK, Json(JobStatusView::from_job(&job))).into_response(),
        Err(GetJobError::NotFound) => problem(
            StatusCode::NOT_FOUND,
            INF_JOB_NOT_FOUND,
            Some("job not found".to_string()),
            None,
            trace_id,
        ),
        Err(GetJobError::Storage(_)) => problem(
            StatusCode::SERVICE_UNAVAILABLE,
            INF_STORAGE_UNAVAILABLE,
            Some("storage unavailable".to_string()),
            None,
            trace_id,
        ),
    }
}

/// Cancels a job; a running job is only flagged.
async fn cancel_job(
    State(state): State<AppState>,
    Extension(trace_id): Extension<TraceId>,
    Path(job_id): Path<String>,
) -> Response {
    let trace_id = Some(trace_id.0);
    let job_id = match parse_job_id(&job_id, &trace_id) {
        Ok(id) => id,
        Err(response) => return response,
    };

    match CancelJobUseCase::execute(&state.ctx, job_id).await {
        Ok(job) => (StatusCode::OK, Json(JobStateResponse::new(&job))).into_response(),
        Err(CancelJobError::NotFound) => problem(
            StatusCode::NOT_FOUND,
            INF_JOB_NOT_FOUND,
            Some("job not found".to_string()),
            None,
            trace_id,
        ),
        Err(CancelJobError::AlreadyTerminal(current)) => problem(
            StatusCode::CONFLICT,
            INF_JOB_ALREADY_TERMINAL,
            Some(format!("job is already {}", current.as_str())),
            None,
            trace_id,
        ),
        Err(CancelJobError::Storage(_)) => problem(
            StatusCode::SERVICE_UNAVAILABLE,
            INF_STORAGE_UNAVAILABLE,
            Some("storage unavailable".to_string()),
            None,
            trace_id,
        ),
    }
}
