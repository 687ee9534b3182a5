// Use case: heartbeat_job.

use crate::application::context::AppContext;
use crate::domain::entities::job::Job;
use crate::domain::services::job_lifecycle::{JobLifecycleError, JobLifecycleService};
use crate::domain::value_objects::ids::JobId;
use std::sync::Arc;
use time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::warn;

/// Records a heartbeat for a leased job and extends its lease.
pub struct HeartbeatJobUseCase;

#[derive(Debug, PartialEq, Eq)]
pub enum HeartbeatJobError {
    NotFound,
    LeaseLost,
    Storage(String),
}

impl From<JobLifecycleError> for HeartbeatJobError {
    fn from(err: JobLifecycleError) -> Self {
        match err {
            JobLifecycleError::NotFound => HeartbeatJobError::NotFound,
            JobLifecycleError::LeaseLost => HeartbeatJobError::LeaseLost,
            other => HeartbeatJobError::Storage(format!("{other:?}")),
        }
    }
}

impl HeartbeatJobUseCase {
    /// Record a heartbeat and extend the lease for a job owned by a worker.
    pub async fn execute(
        ctx: &AppContext,
        job_id: JobId,
        worker_id: &str,
    ) -> Result<Job, HeartbeatJobError> {
        Ok(ctx.job_lifecycle.heartbeat(job_id, worker_id).await?)
    }

    /// Heartbeat every `interval` in the background until the returned
    /// sender is set or dropped, or the lease is lost.
    pub fn spawn(
        lifecycle: Arc<dyn JobLifecycleService>,
        job_id: JobId,
        worker_id: String,
        interval: Duration,
    ) -> (watch::Sender<bool>, JoinHandle<()>) {
        let (tx, mut rx) = watch::channel(false);
        let period = std::time::Duration::from_millis(interval.whole_milliseconds().max(1) as u64);

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    changed = rx.changed() => {
                        if changed.is_err() || *rx.borrow() {
                            break;
                        }
                    }
                    _ = tokio::time::sleep(period) => {
                        match lifecycle.heartbeat(job_id, &worker_id).await {
                            Ok(_) => {}
                            Err(JobLifecycleError::LeaseLost) | Err(JobLifecycleError::NotFound) => {
                                warn!(job_id = %job_id, worker_id = %worker_id, "job_lease_lost");
                                break;
                            }
                            Err(e) => {
                                warn!(job_id = %job_id, error = ?e, "job_heartbeat_failed");
                            }
                        }
                    }
                }
            }
        });

        (tx, handle)
    }
}
