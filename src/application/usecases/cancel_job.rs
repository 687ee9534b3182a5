// Use case: cancel_job.

use crate::application::context::AppContext;
use crate::application::usecases::notify_completion::NotifyCompletionUseCase;
use crate::domain::entities::job::{Job, JobState};
use crate::domain::services::job_lifecycle::JobLifecycleError;
use crate::domain::value_objects::ids::JobId;
use crate::domain::workflows::state_machine::TransitionError;
use tracing::info;

/// Cancels a job for the caller.
///
/// Queued and retrying jobs end at once. A running job is only flagged; its
/// worker stops at the next stage boundary.
pub struct CancelJobUseCase;

#[derive(Debug, PartialEq, Eq)]
pub enum CancelJobError {
    NotFound,
    AlreadyTerminal(JobState),
    Storage(String),
}

impl CancelJobUseCase {
    pub async fn execute(ctx: &AppContext, job_id: JobId) -> Result<Job, CancelJobError> {
        // Step 1: Ask the lifecycle service to cancel or flag the job.
        let job = ctx
            .job_lifecycle
            .cancel(job_id)
            .await
            .map_err(|e| match e {
                JobLifecycleError::NotFound => CancelJobError::NotFound,
                JobLifecycleError::Transition(TransitionError::Forbidden { from, .. }) => {
                    CancelJobError::AlreadyTerminal(from)
                }
                other => CancelJobError::Storage(format!("{other:?}")),
            })?;

        // Step 2: Record what happened.
        info!(
            job_id = %job.id,
            state = job.state.as_str(),
            cancel_requested = job.cancel_requested,
            "job_cancel_requested"
        );

        // Step 3: A job canceled outright is finished; a flagged one is announced by its worker.
        if job.state.is_terminal() {
            NotifyCompletionUseCase::execute(ctx, &job).await;
        }

        Ok(job)
    }
}
