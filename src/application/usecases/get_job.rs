// Use case: get_job.

use crate::application::context::AppContext;
use crate::domain::entities::job::{Job, StageTimings};
use crate::domain::value_objects::ids::JobId;
use serde::Serialize;
use serde_json::Value;

/// Fetches a job by its ID.
pub struct GetJobUseCase;

#[derive(Debug, PartialEq, Eq)]
pub enum GetJobError {
    NotFound,
    Storage(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultView {
    pub storage_key: String,
    pub metadata: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureView {
    pub kind: String,
    pub reason: String,
}

/// Caller-facing status of a job; also the completion notification body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobStatusView {
    pub job_id: String,
    pub job_type: String,
    pub state: String,
    pub priority: String,
    pub attempts: u32,
    pub cancel_requested: bool,
    pub timings_ms: StageTimings,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ResultView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureView>,
    pub created_at: String,
    pub updated_at: String,
}

impl JobStatusView {
    pub fn from_job(job: &Job) -> Self {
        Self {
            job_id: job.id.to_string(),
            job_type: job.job_type.clone(),
            state: job.state.as_str().to_string(),
            priority: job.priority.as_str().to_string(),
            attempts: job.attempt,
            cancel_requested: job.cancel_requested,
            timings_ms: job.timings.clone(),
            result: job.result.as_ref().map(|r| ResultView {
                storage_key: r.storage_key.clone(),
                metadata: r.metadata.clone(),
            }),
            failure: job.failure.as_ref().map(|f| FailureView {
                kind: f.kind.as_str().to_string(),
                reason: f.reason.clone(),
            }),
            created_at: job.created_at.to_rfc3339(),
            updated_at: job.updated_at.to_rfc3339(),
        }
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

impl GetJobUseCase {
    /// Get a job by ID.
    pub async fn execute(ctx: &AppContext, job_id: JobId) -> Result<Job, GetJobError> {
        // Step 1: Fetch the job from storage.
        let job = ctx
            .repos
            .job
            .get(job_id)
            .await
            .map_err(|e| GetJobError::Storage(format!("{e:?}")))?;

        // Step 2: Return NotFound when missing.
        job.ok_or(GetJobError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::{GetJobError, GetJobUseCase, JobStatusView};
    use crate::application::context::test_support::test_context;
    use crate::domain::entities::job::{
        Failure, FailureKind, Job, JobSpec, JobState, StageTimings,
    };
    use crate::domain::value_objects::ids::JobId;
    use crate::domain::value_objects::timestamps::Timestamp;
    use serde_json::json;

    #[tokio::test]
    async fn given_existing_job_when_execute_should_return_job() {
        let ctx = test_context();
        let admitted = ctx
            .job_lifecycle
            .submit(JobSpec::new("superres-x4", json!({})))
            .await
            .unwrap()
            .job;

        let job = GetJobUseCase::execute(&ctx, admitted.id).await.unwrap();

        assert_eq!(job, admitted);
    }

    #[tokio::test]
    async fn given_missing_job_when_execute_should_return_not_found() {
        let ctx = test_context();

        let result = GetJobUseCase::execute(&ctx, JobId::new()).await;

        assert_eq!(result, Err(GetJobError::NotFound));
    }

    #[test]
    fn given_failed_job_when_viewed_should_expose_failure_and_hide_result() {
        let now = Timestamp::now_utc();
        let mut job = Job::admit(JobId::new(), JobSpec::new("ghost", json!({})), now);
        job.reject(Failure::new(FailureKind::UnknownJobType, "nope"), now)
            .unwrap();

        let value = JobStatusView::from_job(&job).to_value();

        assert_eq!(job.state, JobState::Failed);
        assert_eq!(value["state"], "failed");
        assert_eq!(value["attempts"], 0);
        assert_eq!(value["failure"]["kind"], "unknown_job_type");
        assert!(value.get("result").is_none());
    }

    #[tokio::test]
    async fn given_retrying_job_when_viewed_should_not_expose_retry_schedule() {
        let ctx = test_context();
        let admitted = ctx
            .job_lifecycle
            .submit(JobSpec::new("superres-x4", json!({})))
            .await
            .unwrap()
            .job;
        ctx.job_lifecycle
            .claim(admitted.id, "slot-a")
            .await
            .unwrap()
            .unwrap();
        let job = ctx
            .job_lifecycle
            .fail(
                admitted.id,
                "slot-a",
                Failure::new(FailureKind::Infrastructure, "device reset"),
                StageTimings::new(),
            )
            .await
            .unwrap();

        let value = JobStatusView::from_job(&job).to_value();

        assert_eq!(job.state, JobState::Retrying);
        assert!(job.retry_at.is_some());
        assert_eq!(value["state"], "retrying");
        assert_eq!(value["attempts"], 1);
        assert!(value.get("retry_at").is_none());
    }
}
