// Use case: submit_job.

use crate::application::context::AppContext;
use crate::application::usecases::notify_completion::NotifyCompletionUseCase;
use crate::domain::entities::job::{JobSpec, JobValidationError};
use crate::domain::services::job_lifecycle::{Admission, JobLifecycleError};
use tracing::info;

/// Admits a job spec, or resolves it to the job already admitted for its key.
pub struct SubmitJobUseCase;

#[derive(Debug, PartialEq, Eq)]
pub enum SubmitJobError {
    Invalid(JobValidationError),
    Storage(String),
}

impl SubmitJobUseCase {
    pub async fn execute(ctx: &AppContext, spec: JobSpec) -> Result<Admission, SubmitJobError> {
        // Step 1: Hand the submission to the lifecycle service.
        let admission = ctx
            .job_lifecycle
            .submit(spec)
            .await
            .map_err(|e| match e {
                JobLifecycleError::Validation(err) => SubmitJobError::Invalid(err),
                other => SubmitJobError::Storage(format!("{other:?}")),
            })?;

        // Step 2: Record the admission decision.
        info!(
            job_id = %admission.job.id,
            job_type = %admission.job.job_type,
            priority = admission.job.priority.as_str(),
            state = admission.job.state.as_str(),
            deduplicated = admission.deduplicated,
            "job_submitted"
        );

        // Step 3: A job rejected at admission is already final.
        if !admission.deduplicated && admission.job.state.is_terminal() {
            NotifyCompletionUseCase::execute(ctx, &admission.job).await;
        }

        Ok(admission)
    }
}
