// Use case: requeue_expired_leases.

use crate::application::context::AppContext;
use crate::application::usecases::notify_completion::NotifyCompletionUseCase;
use crate::domain::entities::job::Job;
use crate::domain::value_objects::timestamps::Timestamp;

/// Treats jobs whose lease lapsed as lost-worker failures.
pub struct RequeueExpiredLeasesUseCase;

#[derive(Debug)]
pub enum RequeueExpiredLeasesError {
    Storage(String),
}

impl RequeueExpiredLeasesUseCase {
    /// Returns the jobs that were moved out of `Running`.
    pub async fn execute(
        ctx: &AppContext,
        now: Timestamp,
        limit: u32,
    ) -> Result<Vec<Job>, RequeueExpiredLeasesError> {
        // Step 1: Let the lifecycle decide retry or terminal for each job.
        let jobs = ctx
            .job_lifecycle
            .reap_expired(now, limit)
            .await
            .map_err(|e| RequeueExpiredLeasesError::Storage(format!("{e:?}")))?;

        // Step 2: Announce jobs that ran out of attempts.
        for job in jobs.iter().filter(|j| j.state.is_terminal()) {
            NotifyCompletionUseCase::execute(ctx, job).await;
        }

        Ok(jobs)
    }
}
