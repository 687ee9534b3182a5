// Use case: recover_queue.

use crate::application::context::AppContext;
use tracing::info;

/// Rebuilds the in-process dispatch queue from persisted pending jobs.
pub struct RecoverQueueUseCase;

#[derive(Debug)]
pub enum RecoverQueueError {
    Storage(String),
}

impl RecoverQueueUseCase {
    /// Returns the number of jobs put back in their lanes.
    pub async fn execute(ctx: &AppContext) -> Result<usize, RecoverQueueError> {
        let enqueued = ctx
            .job_lifecycle
            .recover(u32::MAX)
            .await
            .map_err(|e| RecoverQueueError::Storage(format!("{e:?}")))?;

        let depths = ctx.queue.depths();
        info!(
            enqueued,
            high = depths.high,
            normal = depths.normal,
            low = depths.low,
            "queue_recovered"
        );
        Ok(enqueued)
    }
}
