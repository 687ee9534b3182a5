// Use case: scheduler.

use crate::application::context::AppContext;
use crate::application::usecases::queue_due_jobs::{QueueDueJobsError, QueueDueJobsUseCase};
use crate::application::usecases::requeue_expired_leases::{
    RequeueExpiredLeasesError, RequeueExpiredLeasesUseCase,
};
use crate::domain::value_objects::timestamps::Timestamp;
use time::Duration;
use tracing::{debug, error};

/// Periodic housekeeping: due retries, expired leases, stale idempotency keys.
pub struct SchedulerUseCase;

#[derive(Debug)]
pub enum SchedulerError {
    Storage(String),
    Promote(QueueDueJobsError),
    Reap(RequeueExpiredLeasesError),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaintenancePass {
    pub promoted: usize,
    pub reaped: usize,
    pub purged_keys: u64,
}

impl SchedulerUseCase {
    /// Run one maintenance pass.
    pub async fn run_once(
        ctx: &AppContext,
        now: Timestamp,
        limit: u32,
    ) -> Result<MaintenancePass, SchedulerError> {
        // Step 1: Put due retries back in their lanes.
        let promoted = QueueDueJobsUseCase::execute(ctx, now, limit)
            .await
            .map_err(SchedulerError::Promote)?;

        // Step 2: Fail lapsed leases; a job reaped here waits out its backoff.
        let reaped = RequeueExpiredLeasesUseCase::execute(ctx, now, limit)
            .await
            .map_err(SchedulerError::Reap)?;

        // Step 3: Drop expired idempotency keys.
        let purged_keys = ctx
            .repos
            .idempotency
            .purge_expired(now, limit)
            .await
            .map_err(|e| SchedulerError::Storage(format!("{e:?}")))?;

        Ok(MaintenancePass {
            promoted,
            reaped: reaped.len(),
            purged_keys,
        })
    }

    /// Run maintenance passes at a fixed interval until shutdown.
    pub async fn run_loop(
        ctx: &AppContext,
        poll_interval: Duration,
        limit: u32,
        mut shutdown: tokio::sync::watch::Receiver<bool>,
    ) {
        let sleep_duration =
            std::time::Duration::from_millis(poll_interval.whole_milliseconds().max(0) as u64);

        // Step 1: Loop until shutdown is triggered.
        loop {
            if *shutdown.borrow() {
                break;
            }

            // Step 2: One pass; a failed pass is retried on the next tick.
            match Self::run_once(ctx, Timestamp::now_utc(), limit).await {
                Ok(pass) if pass != MaintenancePass::default() => {
                    debug!(
                        promoted = pass.promoted,
                        reaped = pass.reaped,
                        purged_keys = pass.purged_keys,
                        "maintenance_pass"
                    );
                }
                Ok(_) => {}
                Err(e) => error!(error = ?e, "maintenance_pass_failed"),
            }

            // Step 3: Sleep until the next tick or shutdown.
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = tokio::time::sleep(sleep_duration) => {}
            }
        }
    }
}
