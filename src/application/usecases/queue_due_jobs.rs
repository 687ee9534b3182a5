// Use case: queue_due_jobs.

use crate::application::context::AppContext;
use crate::domain::value_objects::timestamps::Timestamp;

/// Moves retries whose backoff elapsed back into their lane.
pub struct QueueDueJobsUseCase;

#[derive(Debug)]
pub enum QueueDueJobsError {
    Storage(String),
}

impl QueueDueJobsUseCase {
    /// Returns the number of jobs re-enqueued.
    pub async fn execute(
        ctx: &AppContext,
        now: Timestamp,
        limit: u32,
    ) -> Result<usize, QueueDueJobsError> {
        ctx.job_lifecycle
            .promote_due(now, limit)
            .await
            .map_err(|e| QueueDueJobsError::Storage(format!("{e:?}")))
    }
}
