use crate::domain::entities::job::{
    Failure, FailureKind, Job, JobSpec, JobState, JobValidationError, ResultRef, StageTimings,
};
use crate::domain::runners::RunnerRegistry;
use crate::domain::value_objects::ids::JobId;
use crate::domain::value_objects::timestamps::Timestamp;
use crate::domain::workflows::retry_policy::RetryPolicy;
use crate::domain::workflows::state_machine::TransitionError;
use crate::infrastructure::db::repositories::Repositories;
use crate::infrastructure::db::repositories::idempotency_key_repository::BoundJob;
use crate::infrastructure::db::stores::job_store::JobRepositoryError;
use crate::infrastructure::queue::PriorityDispatchQueue;
use async_trait::async_trait;
use metrics::{counter, histogram};
use std::sync::Arc;
use time::Duration;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Optimistic writes retried this many times before giving up.
const MAX_WRITE_ATTEMPTS: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobLifecycleError {
    Validation(JobValidationError),
    NotFound,
    Transition(TransitionError),
    /// The caller no longer holds the lease on the job.
    LeaseLost,
    Storage(String),
}

impl From<TransitionError> for JobLifecycleError {
    fn from(err: TransitionError) -> Self {
        JobLifecycleError::Transition(err)
    }
}

fn storage<E: std::fmt::Debug>(err: E) -> JobLifecycleError {
    JobLifecycleError::Storage(format!("{err:?}"))
}

/// Result of a submission.
#[derive(Debug, Clone, PartialEq)]
pub struct Admission {
    pub job: Job,
    /// `true` when the submission resolved to an already admitted job.
    pub deduplicated: bool,
}

#[derive(Debug, Clone)]
pub struct LifecycleSettings {
    pub max_payload_bytes: usize,
    pub idempotency_ttl: Duration,
    pub visibility_timeout: Duration,
    pub retry_policy: RetryPolicy,
}

impl Default for LifecycleSettings {
    fn default() -> Self {
        Self {
            max_payload_bytes: 1024 * 1024,
            idempotency_ttl: Duration::seconds(3_600),
            visibility_timeout: Duration::seconds(30),
            retry_policy: RetryPolicy::default(),
        }
    }
}

// Job lifecycle orchestration (coordination across job store, key index and queue).
#[async_trait]
pub trait JobLifecycleService: Send + Sync {
    /// Admit a spec, or resolve it to the job already admitted for its key.
    async fn submit(&self, spec: JobSpec) -> Result<Admission, JobLifecycleError>;
    /// `Pending → Running` for `worker_id`; `None` if the job is no longer pending.
    async fn claim(&self, job_id: JobId, worker_id: &str)
    -> Result<Option<Job>, JobLifecycleError>;
    /// Extend the lease held by `worker_id`.
    async fn heartbeat(&self, job_id: JobId, worker_id: &str) -> Result<Job, JobLifecycleError>;
    /// `Running → Succeeded`.
    async fn complete(
        &self,
        job_id: JobId,
        worker_id: &str,
        timings: StageTimings,
        result: ResultRef,
    ) -> Result<Job, JobLifecycleError>;
    /// `Running → Retrying | Failed`, as the retry policy decides.
    async fn fail(
        &self,
        job_id: JobId,
        worker_id: &str,
        failure: Failure,
        timings: StageTimings,
    ) -> Result<Job, JobLifecycleError>;
    /// `Running → Canceled` after the worker observed a cancel request.
    async fn acknowledge_cancel(
        &self,
        job_id: JobId,
        worker_id: &str,
    ) -> Result<Job, JobLifecycleError>;
    /// Caller-initiated cancel. Immediate unless the job is running.
    async fn cancel(&self, job_id: JobId) -> Result<Job, JobLifecycleError>;
    /// Move due retries back to `Pending` and re-enqueue them.
    async fn promote_due(&self, now: Timestamp, limit: u32) -> Result<usize, JobLifecycleError>;
    /// Fail jobs whose lease expired with a `LostWorker` failure; returns them.
    async fn reap_expired(&self, now: Timestamp, limit: u32)
    -> Result<Vec<Job>, JobLifecycleError>;
    /// Re-enqueue every persisted `Pending` job.
    async fn recover(&self, limit: u32) -> Result<usize, JobLifecycleError>;
}

pub struct JobLifecycle {
    repos: Repositories,
    queue: Arc<PriorityDispatchQueue>,
    registry: Arc<RunnerRegistry>,
    settings: LifecycleSettings,
    admission: Mutex<()>,
}

impl JobLifecycle {
    pub fn new(
        repos: Repositories,
        queue: Arc<PriorityDispatchQueue>,
        registry: Arc<RunnerRegistry>,
        settings: LifecycleSettings,
    ) -> Self {
        Self {
            repos,
            queue,
            registry,
            settings,
            admission: Mutex::new(()),
        }
    }

    async fn load(&self, job_id: JobId) -> Result<Job, JobLifecycleError> {
        self.repos
            .job
            .get(job_id)
            .await
            .map_err(storage)?
            .ok_or(JobLifecycleError::NotFound)
    }

    /// Read-modify-write with optimistic retry.
    ///
    /// `apply` returns `false` to leave the job untouched, in which case
    /// `None` is returned.
    async fn mutate<F>(&self, job_id: JobId, mut apply: F) -> Result<Option<Job>, JobLifecycleError>
    where
        F: FnMut(&mut Job) -> Result<bool, JobLifecycleError> + Send,
    {
        for _ in 0..MAX_WRITE_ATTEMPTS {
            let mut job = self.load(job_id).await?;
            if !apply(&mut job)? {
                return Ok(None);
            }
            match self.repos.job.update(&job).await {
                Ok(stored) => return Ok(Some(stored)),
                Err(JobRepositoryError::Conflict) => continue,
                Err(JobRepositoryError::NotFound) => return Err(JobLifecycleError::NotFound),
                Err(err) => return Err(storage(err)),
            }
        }
        Err(JobLifecycleError::Storage("write_contention".to_string()))
    }

    async fn mutate_owned<F>(
        &self,
        job_id: JobId,
        worker_id: &str,
        mut apply: F,
    ) -> Result<Job, JobLifecycleError>
    where
        F: FnMut(&mut Job) -> Result<(), JobLifecycleError> + Send,
    {
        self.mutate(job_id, |job| {
            if !job.is_claimed_by(worker_id) {
                return Err(JobLifecycleError::LeaseLost);
            }
            apply(job)?;
            Ok(true)
        })
        .await?
        .ok_or(JobLifecycleError::LeaseLost)
    }

    fn jitter_seed(job: &Job) -> u64 {
        (job.id.0.as_u128() as u64).wrapping_add(u64::from(job.attempt))
    }

    fn unknown_type_reason(&self, job_type: &str) -> String {
        format!(
            "no runner registered for job type `{job_type}` (known: {})",
            self.registry.job_types().join(", ")
        )
    }
}

/// Structured event and metrics for a job that reached a terminal state.
fn report_finished(job: &Job) {
    let state = job.state.as_str();
    let priority = job.priority.as_str();
    counter!("jobs_finished_total", "state" => state, "priority" => priority).increment(1);
    for (stage, ms) in &job.timings {
        histogram!("job_stage_duration_ms", "stage" => stage.clone()).record(*ms);
    }
    let timings = serde_json::to_string(&job.timings).unwrap_or_default();
    info!(
        job_id = %job.id,
        job_type = %job.job_type,
        priority,
        state,
        attempt = job.attempt,
        timings_ms = %timings,
        failure_kind = job.failure.as_ref().map(|f| f.kind.as_str()).unwrap_or(""),
        "job_finished"
    );
}

#[async_trait]
impl JobLifecycleService for JobLifecycle {
    async fn submit(&self, spec: JobSpec) -> Result<Admission, JobLifecycleError> {
        // Step 1: Reject malformed specs before touching shared state.
        spec.validate(self.settings.max_payload_bytes)
            .map_err(JobLifecycleError::Validation)?;

        // Step 2: Serialize resolve + create + record + enqueue.
        let key = spec.idempotency_key();
        let _admission = self.admission.lock().await;
        let now = Timestamp::now_utc();

        // Step 3: A live key resolves to the job it already names.
        if let Some(job_id) = self
            .repos
            .idempotency
            .resolve(&key, now)
            .await
            .map_err(storage)?
        {
            let job = self.load(job_id).await?;
            return Ok(Admission {
                job,
                deduplicated: true,
            });
        }

        // Step 4: Build the job; unknown types fail at once without consuming an attempt.
        let mut job = Job::admit(JobId::new(), spec, now);
        if !self.registry.contains(&job.job_type) {
            let reason = self.unknown_type_reason(&job.job_type);
            job.reject(Failure::new(FailureKind::UnknownJobType, reason), now)?;
        }

        // Step 5: Create the job and bind the key in one store operation.
        let bound = self
            .repos
            .idempotency
            .bind_new_job(&key, &job, self.settings.idempotency_ttl)
            .await
            .map_err(storage)?;
        let job = match bound {
            BoundJob::Created(job) => job,
            BoundJob::Existing(job_id) => {
                let job = self.load(job_id).await?;
                return Ok(Admission {
                    job,
                    deduplicated: true,
                });
            }
        };

        // Step 6: Make it dispatchable.
        counter!("jobs_submitted_total", "priority" => job.priority.as_str()).increment(1);
        if job.state == JobState::Pending {
            self.queue.enqueue(job.id, job.priority);
        } else {
            report_finished(&job);
        }

        Ok(Admission {
            job,
            deduplicated: false,
        })
    }

    async fn claim(
        &self,
        job_id: JobId,
        worker_id: &str,
    ) -> Result<Option<Job>, JobLifecycleError> {
        let visibility = self.settings.visibility_timeout;
        self.mutate(job_id, |job| {
            if job.state != JobState::Pending {
                return Ok(false);
            }
            let now = Timestamp::now_utc();
            job.claim(worker_id, now.plus(visibility), now)?;
            Ok(true)
        })
        .await
    }

    async fn heartbeat(&self, job_id: JobId, worker_id: &str) -> Result<Job, JobLifecycleError> {
        let visibility = self.settings.visibility_timeout;
        self.mutate_owned(job_id, worker_id, |job| {
            let now = Timestamp::now_utc();
            job.heartbeat(now.plus(visibility), now);
            Ok(())
        })
        .await
    }

    async fn complete(
        &self,
        job_id: JobId,
        worker_id: &str,
        timings: StageTimings,
        result: ResultRef,
    ) -> Result<Job, JobLifecycleError> {
        let job = self
            .mutate_owned(job_id, worker_id, |job| {
                job.succeed(timings.clone(), result.clone(), Timestamp::now_utc())?;
                Ok(())
            })
            .await?;
        report_finished(&job);
        Ok(job)
    }

    async fn fail(
        &self,
        job_id: JobId,
        worker_id: &str,
        failure: Failure,
        timings: StageTimings,
    ) -> Result<Job, JobLifecycleError> {
        let policy = &self.settings.retry_policy;
        let job = self
            .mutate_owned(job_id, worker_id, |job| {
                // Step 1: The attempt that just failed counts.
                let attempt = job.attempt.saturating_add(1);
                let decision = policy.decide(attempt, failure.kind, Self::jitter_seed(job));

                // Step 2: Record the outcome.
                job.timings = timings.clone();
                job.record_failure(failure.clone(), decision, Timestamp::now_utc())?;
                Ok(())
            })
            .await?;

        if job.state == JobState::Retrying {
            counter!("jobs_retried_total", "kind" => failure.kind.as_str()).increment(1);
            warn!(
                job_id = %job.id,
                attempt = job.attempt,
                kind = failure.kind.as_str(),
                reason = %failure.reason,
                retry_at = %job.retry_at.map(|t| t.to_rfc3339()).unwrap_or_default(),
                "job_retry_scheduled"
            );
        } else {
            report_finished(&job);
        }
        Ok(job)
    }

    async fn acknowledge_cancel(
        &self,
        job_id: JobId,
        worker_id: &str,
    ) -> Result<Job, JobLifecycleError> {
        let job = self
            .mutate_owned(job_id, worker_id, |job| {
                job.cancel(Timestamp::now_utc())?;
                Ok(())
            })
            .await?;
        report_finished(&job);
        Ok(job)
    }

    async fn cancel(&self, job_id: JobId) -> Result<Job, JobLifecycleError> {
        let job = self
            .mutate(job_id, |job| {
                match job.state {
                    JobState::Running => {
                        // Best effort; the worker checks between stages.
                        if job.cancel_requested {
                            return Ok(false);
                        }
                        job.cancel_requested = true;
                        job.updated_at = Timestamp::now_utc();
                    }
                    _ => job.cancel(Timestamp::now_utc())?,
                }
                Ok(true)
            })
            .await?;

        let Some(job) = job else {
            return self.load(job_id).await;
        };
        if job.state == JobState::Canceled {
            self.queue.remove(job.id);
            report_finished(&job);
        }
        Ok(job)
    }

    async fn promote_due(&self, now: Timestamp, limit: u32) -> Result<usize, JobLifecycleError> {
        // Step 1: Load retries whose backoff elapsed.
        let due = self
            .repos
            .job
            .list_due_retries(now, limit)
            .await
            .map_err(storage)?;

        // Step 2: Promote each one and put it back at the tail of its lane.
        let mut promoted = 0;
        for candidate in due {
            let updated = self
                .mutate(candidate.id, |job| {
                    let ready = job.state == JobState::Retrying
                        && job.retry_at.is_none_or(|at| at <= now);
                    if !ready {
                        return Ok(false);
                    }
                    job.promote(Timestamp::now_utc())?;
                    Ok(true)
                })
                .await;
            match updated {
                Ok(Some(job)) => {
                    self.queue.enqueue(job.id, job.priority);
                    promoted += 1;
                }
                Ok(None) | Err(JobLifecycleError::NotFound) => {}
                Err(err) => return Err(err),
            }
        }
        Ok(promoted)
    }

    async fn reap_expired(
        &self,
        now: Timestamp,
        limit: u32,
    ) -> Result<Vec<Job>, JobLifecycleError> {
        // Step 1: Load running jobs whose lease lapsed.
        let expired = self
            .repos
            .job
            .list_expired_leases(now, limit)
            .await
            .map_err(storage)?;

        // Step 2: Treat each as a lost worker; a fresh heartbeat wins the race.
        let policy = &self.settings.retry_policy;
        let mut reaped = Vec::new();
        for candidate in expired {
            let updated = self
                .mutate(candidate.id, |job| {
                    if !job.lease_expired(now) {
                        return Ok(false);
                    }
                    let owner = job.lease_owner.clone().unwrap_or_default();
                    let failure = Failure::new(
                        FailureKind::LostWorker,
                        format!("lease expired while held by `{owner}`"),
                    );
                    let attempt = job.attempt.saturating_add(1);
                    let decision = policy.decide(attempt, failure.kind, Self::jitter_seed(job));
                    job.record_failure(failure, decision, Timestamp::now_utc())?;
                    Ok(true)
                })
                .await;
            match updated {
                Ok(Some(job)) => {
                    counter!("jobs_lost_worker_total").increment(1);
                    warn!(job_id = %job.id, state = job.state.as_str(), "job_lease_expired");
                    if job.state.is_terminal() {
                        report_finished(&job);
                    }
                    reaped.push(job);
                }
                Ok(None) | Err(JobLifecycleError::NotFound) => {}
                Err(err) => return Err(err),
            }
        }
        Ok(reaped)
    }

    async fn recover(&self, limit: u32) -> Result<usize, JobLifecycleError> {
        let pending = self
            .repos
            .job
            .list_by_state(JobState::Pending, limit)
            .await
            .map_err(storage)?;

        let mut enqueued = 0;
        for job in pending {
            if self.queue.enqueue(job.id, job.priority) {
                enqueued += 1;
            }
        }
        Ok(enqueued)
    }
}
