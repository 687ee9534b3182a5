// Use case: claim_next_job.

use crate::application::context::AppContext;
use crate::domain::entities::job::Job;
use crate::domain::services::job_lifecycle::JobLifecycleError;
use time::Duration;
use tracing::{debug, warn};

/// Takes the next dispatchable entry and claims its job for a worker.
pub struct ClaimNextJobUseCase;

#[derive(Debug)]
pub enum ClaimNextJobError {
    Storage(String),
}

impl ClaimNextJobUseCase {
    /// Claim the next job, waiting up to `wait` for the queue to fill.
    ///
    /// Entries whose job is no longer pending are skipped.
    pub async fn execute(
        ctx: &AppContext,
        worker_id: &str,
        wait: Duration,
    ) -> Result<Option<Job>, ClaimNextJobError> {
        let wait = std::time::Duration::from_millis(wait.whole_milliseconds().max(0) as u64);

        loop {
            // Step 1: Take the next entry in dispatch order.
            let entry = match ctx.queue.try_dequeue() {
                Some(entry) => entry,
                None => match tokio::time::timeout(wait, ctx.queue.dequeue()).await {
                    Ok(entry) => entry,
                    Err(_) => return Ok(None),
                },
            };

            // Step 2: Claim it; a stale entry loses the race and is dropped.
            match ctx.job_lifecycle.claim(entry.job_id, worker_id).await {
                Ok(Some(job)) => return Ok(Some(job)),
                Ok(None) | Err(JobLifecycleError::NotFound) => {
                    debug!(job_id = %entry.job_id, worker_id, "stale_queue_entry_skipped");
                }
                Err(e) => {
                    // The job is still pending; put the entry back for the next claim.
                    ctx.queue.enqueue(entry.job_id, entry.priority);
                    warn!(job_id = %entry.job_id, worker_id, error = ?e, "claim_failed_requeued");
                    return Err(ClaimNextJobError::Storage(format!("{e:?}")));
                }
            }
        }
    }
}
