// Use case: run_worker_once.

use crate::application::context::AppContext;
use crate::application::usecases::claim_next_job::ClaimNextJobUseCase;
use crate::application::usecases::heartbeat_job::HeartbeatJobUseCase;
use crate::application::usecases::notify_completion::NotifyCompletionUseCase;
use crate::config::Workers;
use crate::domain::entities::job::{Failure, FailureKind, Job, ResultRef, StageTimings};
use crate::domain::runners::{DynRunner, RunnerOutput, RunnerRegistry, SlotContext, StageError};
use crate::domain::services::job_lifecycle::JobLifecycleError;
use crate::domain::value_objects::ids::JobId;
use std::time::Instant;
use time::Duration;
use tracing::{info, instrument, warn};

/// Configuration for worker polling and lease upkeep.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub poll_interval: Duration,
    pub heartbeat_interval: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::milliseconds(500),
            heartbeat_interval: Duration::seconds(10),
        }
    }
}

impl WorkerConfig {
    pub fn from_settings(settings: &Workers) -> Self {
        Self {
            poll_interval: Duration::milliseconds(settings.poll_interval_ms as i64),
            heartbeat_interval: Duration::milliseconds(settings.heartbeat_interval_ms as i64),
        }
    }
}

struct WarmRunner {
    job_type: String,
    runner: Box<dyn DynRunner>,
}

/// A worker's exclusive slot and the runner currently loaded on it.
pub struct WorkerSlot {
    pub slot: SlotContext,
    warm: Option<WarmRunner>,
}

impl WorkerSlot {
    pub fn new(slot_id: impl Into<String>) -> Self {
        Self {
            slot: SlotContext {
                slot_id: slot_id.into(),
            },
            warm: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.slot.slot_id
    }

    /// Job type of the runner kept loaded between jobs, if any.
    pub fn warm_job_type(&self) -> Option<&str> {
        self.warm.as_ref().map(|w| w.job_type.as_str())
    }

    /// Unload the warm runner, if any.
    pub async fn release(&mut self) {
        if let Some(mut warm) = self.warm.take() {
            warm.runner.unload().await;
            info!(slot = %self.slot.slot_id, job_type = %warm.job_type, "runner_unloaded");
        }
    }

    /// Runner for `job_type`, loading it when the slot holds another type.
    ///
    /// Only a cold load is timed into `timings`.
    async fn runner_for(
        &mut self,
        registry: &RunnerRegistry,
        job_type: &str,
        timings: &mut StageTimings,
    ) -> Result<&mut Box<dyn DynRunner>, StageError> {
        // Step 1: Evict a runner warmed for another type.
        if self.warm.as_ref().is_some_and(|w| w.job_type != job_type) {
            self.release().await;
        }

        // Step 2: Build and load a fresh runner on a cold slot.
        if self.warm.is_none() {
            let factory = registry
                .resolve(job_type)
                .map_err(|e| StageError::new(FailureKind::UnknownJobType, e.to_string()))?;
            let mut runner = factory(&self.slot);
            let started = Instant::now();
            let loaded = runner.load().await;
            record_stage(timings, "load", started);
            loaded?;
            self.warm = Some(WarmRunner {
                job_type: job_type.to_string(),
                runner,
            });
        }

        self.warm
            .as_mut()
            .map(|w| &mut w.runner)
            .ok_or_else(|| StageError::retryable("runner unavailable"))
    }
}

/// Executes a single job from the queue (if available).
pub struct RunWorkerOnceUseCase;

#[derive(Debug)]
pub enum RunWorkerOnceError {
    Storage(String),
}

enum StageOutcome {
    Finished(ResultRef),
    Canceled,
}

fn round_ms(ms: f64) -> f64 {
    (ms * 100.0).round() / 100.0
}

fn record_stage(timings: &mut StageTimings, stage: &str, started: Instant) {
    let ms = round_ms(started.elapsed().as_secs_f64() * 1_000.0);
    timings.insert(stage.to_string(), ms);
}

impl RunWorkerOnceUseCase {
    /// Claim the next job, run it on the slot, and persist the outcome.
    ///
    /// Returns the job as stored afterwards, or `None` if nothing was claimed.
    #[instrument(skip(ctx, slot, config), fields(slot = %slot.slot.slot_id))]
    pub async fn execute(
        ctx: &AppContext,
        slot: &mut WorkerSlot,
        config: &WorkerConfig,
    ) -> Result<Option<Job>, RunWorkerOnceError> {
        let worker_id = slot.id().to_string();

        // Step 1: Claim the next dispatchable job.
        let claimed = ClaimNextJobUseCase::execute(ctx, &worker_id, config.poll_interval)
            .await
            .map_err(|e| RunWorkerOnceError::Storage(format!("{e:?}")))?;
        let Some(job) = claimed else {
            return Ok(None);
        };
        info!(job_id = %job.id, job_type = %job.job_type, attempt = job.attempt, "job_claimed");

        // Step 2: Keep the lease alive while the stages run.
        let (stop_heartbeat, heartbeat) = HeartbeatJobUseCase::spawn(
            ctx.job_lifecycle.clone(),
            job.id,
            worker_id.clone(),
            config.heartbeat_interval,
        );

        // Step 3: Run the pipeline and store the result.
        let mut timings = StageTimings::new();
        let outcome = Self::run_stages(ctx, slot, &job, &mut timings).await;

        let _ = stop_heartbeat.send(true);
        let _ = heartbeat.await;

        // Step 4: Persist the outcome while still holding the lease.
        let persisted = match outcome {
            Ok(StageOutcome::Finished(result)) => {
                ctx.job_lifecycle
                    .complete(job.id, &worker_id, timings, result)
                    .await
            }
            Ok(StageOutcome::Canceled) => {
                ctx.job_lifecycle
                    .acknowledge_cancel(job.id, &worker_id)
                    .await
            }
            Err(err) => {
                let failure = Failure::new(err.kind, err.message);
                ctx.job_lifecycle
                    .fail(job.id, &worker_id, failure, timings)
                    .await
            }
        };

        let job = match persisted {
            Ok(job) => job,
            Err(JobLifecycleError::LeaseLost) => {
                warn!(job_id = %job.id, worker_id = %worker_id, "job_outcome_discarded");
                return Self::reload(ctx, job.id).await;
            }
            Err(e) => return Err(RunWorkerOnceError::Storage(format!("{e:?}"))),
        };

        // Step 5: Tell the caller, if they asked to be told.
        NotifyCompletionUseCase::execute(ctx, &job).await;

        Ok(Some(job))
    }

    async fn reload(ctx: &AppContext, job_id: JobId) -> Result<Option<Job>, RunWorkerOnceError> {
        ctx.repos
            .job
            .get(job_id)
            .await
            .map_err(|e| RunWorkerOnceError::Storage(format!("{e:?}")))
    }

    /// Whether the caller asked for this job to stop.
    async fn cancel_requested(ctx: &AppContext, job_id: JobId) -> bool {
        matches!(ctx.repos.job.get(job_id).await, Ok(Some(job)) if job.cancel_requested)
    }

    async fn run_stages(
        ctx: &AppContext,
        slot: &mut WorkerSlot,
        job: &Job,
        timings: &mut StageTimings,
    ) -> Result<StageOutcome, StageError> {
        // Step 1: Reuse the warm runner or load one.
        let runner = slot.runner_for(&ctx.registry, &job.job_type, timings).await?;
        if Self::cancel_requested(ctx, job.id).await {
            return Ok(StageOutcome::Canceled);
        }

        // Step 2: prepare -> infer -> postprocess, checking for cancel in between.
        let started = Instant::now();
        let prepared = runner.prepare(&job.payload).await;
        record_stage(timings, "prepare", started);
        let prepared = prepared?;
        if Self::cancel_requested(ctx, job.id).await {
            return Ok(StageOutcome::Canceled);
        }

        let started = Instant::now();
        let output = runner.infer(prepared).await;
        record_stage(timings, "infer", started);
        let output = output?;
        if Self::cancel_requested(ctx, job.id).await {
            return Ok(StageOutcome::Canceled);
        }

        let started = Instant::now();
        let output = runner.postprocess(output).await;
        record_stage(timings, "postprocess", started);
        let output = output?;

        // Step 3: Hand the product to storage.
        let started = Instant::now();
        let stored = Self::store_result(ctx, job.id, output).await;
        record_stage(timings, "storage", started);
        Ok(StageOutcome::Finished(stored?))
    }

    async fn store_result(
        ctx: &AppContext,
        job_id: JobId,
        output: RunnerOutput,
    ) -> Result<ResultRef, StageError> {
        let (bytes, key) = match output.artifact {
            Some(artifact) => (
                artifact.bytes,
                format!("results/{job_id}.{}", artifact.extension),
            ),
            None => (
                serde_json::to_vec(&output.metadata)
                    .map_err(|e| StageError::retryable(format!("result encoding failed: {e}")))?,
                format!("results/{job_id}.json"),
            ),
        };

        let storage_key = ctx
            .storage
            .put(bytes, &key)
            .await
            .map_err(|e| StageError::retryable(format!("result storage failed: {e}")))?;

        Ok(ResultRef {
            storage_key,
            metadata: output.metadata,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{RunWorkerOnceUseCase, WorkerConfig, WorkerSlot, round_ms};
    use crate::application::context::test_support::{test_context, test_context_with};
    use crate::domain::entities::job::{FailureKind, JobSpec, JobState};
    use crate::domain::runners::{Runner, RunnerOutput, RunnerRegistryBuilder, StageError};
    use async_trait::async_trait;
    use serde_json::{Value, json};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use time::Duration;

    fn config() -> WorkerConfig {
        WorkerConfig {
            poll_interval: Duration::milliseconds(10),
            heartbeat_interval: Duration::milliseconds(50),
        }
    }

    fn raster() -> Value {
        json!({"width": 2, "height": 2, "pixels_hex": "00407fff"})
    }

    #[test]
    fn given_fractional_ms_when_rounded_should_keep_two_decimals() {
        assert_eq!(round_ms(12.3456), 12.35);
        assert_eq!(round_ms(0.001), 0.0);
    }

    #[tokio::test]
    async fn given_empty_queue_when_execute_should_return_none() {
        let ctx = test_context();
        let mut slot = WorkerSlot::new("gpu-0");

        let result = RunWorkerOnceUseCase::execute(&ctx, &mut slot, &config())
            .await
            .unwrap();

        assert!(result.is_none());
    }

    #[tokio::test]
    async fn given_superres_job_when_execute_should_store_artifact_and_succeed() {
        let ctx = test_context();
        let mut slot = WorkerSlot::new("gpu-0");
        let job = ctx
            .job_lifecycle
            .submit(JobSpec::new("superres-x4", raster()))
            .await
            .unwrap()
            .job;

        let done = RunWorkerOnceUseCase::execute(&ctx, &mut slot, &config())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(done.id, job.id);
        assert_eq!(done.state, JobState::Succeeded);
        for stage in ["load", "prepare", "infer", "postprocess", "storage"] {
            assert!(done.timings.contains_key(stage), "missing {stage}");
        }
        let result = done.result.unwrap();
        assert_eq!(result.storage_key, format!("results/{}.pgm", job.id));
        assert_eq!(result.metadata["size"], json!([8, 8]));
        let bytes = ctx.storage.get(&result.storage_key).await.unwrap();
        assert!(bytes.starts_with(b"P5\n8 8\n255\n"));
        assert_eq!(slot.warm_job_type(), Some("superres-x4"));
    }

    #[tokio::test]
    async fn given_warm_runner_when_same_type_runs_again_should_skip_load_timing() {
        let ctx = test_context();
        let mut slot = WorkerSlot::new("gpu-0");
        ctx.job_lifecycle
            .submit(JobSpec::new("image-scoring-v1", raster()))
            .await
            .unwrap();
        ctx.job_lifecycle
            .submit(JobSpec::new("image-scoring-v1", raster()).with_dedup_key("second"))
            .await
            .unwrap();

        let first = RunWorkerOnceUseCase::execute(&ctx, &mut slot, &config())
            .await
            .unwrap()
            .unwrap();
        let second = RunWorkerOnceUseCase::execute(&ctx, &mut slot, &config())
            .await
            .unwrap()
            .unwrap();

        assert!(first.timings.contains_key("load"));
        assert!(!second.timings.contains_key("load"));
        assert_eq!(second.state, JobState::Succeeded);
        assert_eq!(
            second.result.unwrap().storage_key,
            format!("results/{}.json", second.id)
        );
    }

    #[tokio::test]
    async fn given_bad_payload_when_execute_should_fail_without_retry() {
        let ctx = test_context();
        let mut slot = WorkerSlot::new("gpu-0");
        ctx.job_lifecycle
            .submit(JobSpec::new("superres-x4", json!({"width": 2, "height": 2})))
            .await
            .unwrap();

        let done = RunWorkerOnceUseCase::execute(&ctx, &mut slot, &config())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(done.state, JobState::Failed);
        assert_eq!(done.attempt, 1);
        assert_eq!(done.failure.unwrap().kind, FailureKind::InvalidInput);
    }

    struct Flaky {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Runner for Flaky {
        type Prepared = ();
        type Output = ();

        async fn prepare(&mut self, _payload: &Value) -> Result<(), StageError> {
            Ok(())
        }

        async fn infer(&mut self, _prepared: ()) -> Result<(), StageError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(StageError::retryable("device reset"))
        }

        async fn postprocess(&mut self, _output: ()) -> Result<RunnerOutput, StageError> {
            Ok(RunnerOutput {
                artifact: None,
                metadata: json!({}),
            })
        }
    }

    #[tokio::test]
    async fn given_retryable_stage_error_when_execute_should_schedule_retry() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let mut builder = RunnerRegistryBuilder::new();
        builder
            .register("flaky-v1", move |_slot| Flaky {
                calls: counter.clone(),
            })
            .unwrap();
        let ctx = test_context_with(builder.build());
        let mut slot = WorkerSlot::new("gpu-0");
        ctx.job_lifecycle
            .submit(JobSpec::new("flaky-v1", json!({})))
            .await
            .unwrap();

        let done = RunWorkerOnceUseCase::execute(&ctx, &mut slot, &config())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(done.state, JobState::Retrying);
        assert_eq!(done.attempt, 1);
        assert!(done.retry_at.is_some());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn given_cancel_requested_before_stages_when_execute_should_cancel() {
        let ctx = test_context();
        let mut slot = WorkerSlot::new("gpu-0");
        let job = ctx
            .job_lifecycle
            .submit(JobSpec::new("superres-x4", raster()))
            .await
            .unwrap()
            .job;
        // Simulate a cancel arriving right after the claim.
        let mut stored = ctx.repos.job.get(job.id).await.unwrap().unwrap();
        stored.cancel_requested = true;
        ctx.repos.job.update(&stored).await.unwrap();

        let done = RunWorkerOnceUseCase::execute(&ctx, &mut slot, &config())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(done.state, JobState::Canceled);
        assert!(done.result.is_none());
    }

    #[tokio::test]
    async fn given_type_switch_when_execute_should_evict_previous_runner() {
        let ctx = test_context();
        let mut slot = WorkerSlot::new("gpu-0");
        ctx.job_lifecycle
            .submit(JobSpec::new("superres-x4", raster()))
            .await
            .unwrap();
        RunWorkerOnceUseCase::execute(&ctx, &mut slot, &config())
            .await
            .unwrap();
        ctx.job_lifecycle
            .submit(JobSpec::new("image-scoring-v1", raster()))
            .await
            .unwrap();

        let done = RunWorkerOnceUseCase::execute(&ctx, &mut slot, &config())
            .await
            .unwrap()
            .unwrap();

        assert!(done.timings.contains_key("load"));
        assert_eq!(slot.warm_job_type(), Some("image-scoring-v1"));
        slot.release().await;
        assert_eq!(slot.warm_job_type(), None);
    }
}
