use async_trait::async_trait;
use inferd::application::context::AppContext;
use inferd::application::usecases::cancel_job::{CancelJobError, CancelJobUseCase};
use inferd::application::usecases::scheduler::SchedulerUseCase;
use inferd::application::usecases::worker_manager::WorkerManager;
use inferd::config::Settings;
use inferd::domain::entities::job::{FailureKind, Job, JobSpec, JobState};
use inferd::domain::runners::builtin::register_builtin;
use inferd::domain::runners::{Artifact, Runner, RunnerOutput, RunnerRegistryBuilder, StageError};
use inferd::domain::value_objects::ids::JobId;
use inferd::infrastructure::db::repositories::Repositories;
use inferd::infrastructure::notify::{CompletionNotifier, NotifyError};
use inferd::infrastructure::storage::{MemoryStorage, ObjectStorage};
use serde_json::{Value, json};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

#[derive(Default)]
struct RecordingNotifier {
    sent: Mutex<Vec<(String, Value)>>,
}

#[async_trait]
impl CompletionNotifier for RecordingNotifier {
    async fn notify(&self, target: &str, body: &Value) -> Result<(), NotifyError> {
        self.sent
            .lock()
            .unwrap()
            .push((target.to_string(), body.clone()));
        Ok(())
    }
}

/// Echoes the payload back; counts model loads.
struct EchoRunner {
    loads: Arc<AtomicUsize>,
}

#[async_trait]
impl Runner for EchoRunner {
    type Prepared = Value;
    type Output = Value;

    async fn load(&mut self) -> Result<(), StageError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn prepare(&mut self, payload: &Value) -> Result<Value, StageError> {
        Ok(payload.clone())
    }

    async fn infer(&mut self, prepared: Value) -> Result<Value, StageError> {
        Ok(prepared)
    }

    async fn postprocess(&mut self, output: Value) -> Result<RunnerOutput, StageError> {
        Ok(RunnerOutput {
            artifact: Some(Artifact {
                bytes: output.to_string().into_bytes(),
                extension: "txt",
            }),
            metadata: json!({ "echo": output }),
        })
    }
}

/// Fails with a retryable error for the first `failures` inference calls.
struct FlakyRunner {
    calls: Arc<AtomicU32>,
    failures: u32,
}

#[async_trait]
impl Runner for FlakyRunner {
    type Prepared = ();
    type Output = u32;

    async fn prepare(&mut self, _payload: &Value) -> Result<(), StageError> {
        Ok(())
    }

    async fn infer(&mut self, _prepared: ()) -> Result<u32, StageError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call <= self.failures {
            return Err(StageError::retryable(format!("device reset on call {call}")));
        }
        Ok(call)
    }

    async fn postprocess(&mut self, call: u32) -> Result<RunnerOutput, StageError> {
        Ok(RunnerOutput {
            artifact: None,
            metadata: json!({ "succeeded_on_call": call }),
        })
    }
}

/// Holds inference long enough for a cancel to land.
struct SlowRunner;

#[async_trait]
impl Runner for SlowRunner {
    type Prepared = ();
    type Output = ();

    async fn prepare(&mut self, _payload: &Value) -> Result<(), StageError> {
        Ok(())
    }

    async fn infer(&mut self, _prepared: ()) -> Result<(), StageError> {
        tokio::time::sleep(std::time::Duration::from_millis(300)).await;
        Ok(())
    }

    async fn postprocess(&mut self, _output: ()) -> Result<RunnerOutput, StageError> {
        Ok(RunnerOutput {
            artifact: None,
            metadata: json!({}),
        })
    }
}

struct Harness {
    ctx: Arc<AppContext>,
    storage: Arc<MemoryStorage>,
    notifier: Arc<RecordingNotifier>,
    manager: WorkerManager,
    maintenance: watch::Sender<bool>,
    loads: Arc<AtomicUsize>,
    flaky_calls: Arc<AtomicU32>,
}

fn settings(slots: &[&str]) -> Settings {
    let mut settings = Settings::default();
    settings.workers.slots = slots.iter().map(|s| s.to_string()).collect();
    settings.workers.poll_interval_ms = 10;
    settings.workers.heartbeat_interval_ms = 50;
    settings.retry.base_delay_ms = 10;
    settings.retry.max_delay_ms = 40;
    settings.retry.jitter_ms = 0;
    settings
}

async fn start(slots: &[&str], flaky_failures: u32) -> Harness {
    let settings = settings(slots);
    let loads = Arc::new(AtomicUsize::new(0));
    let flaky_calls = Arc::new(AtomicU32::new(0));

    let mut registry = RunnerRegistryBuilder::new();
    register_builtin(&mut registry).unwrap();
    let echo_loads = loads.clone();
    let calls = flaky_calls.clone();
    registry
        .register("echo-v1", move |_slot| EchoRunner {
            loads: echo_loads.clone(),
        })
        .unwrap()
        .register("flaky-v1", move |_slot| FlakyRunner {
            calls: calls.clone(),
            failures: flaky_failures,
        })
        .unwrap()
        .register("slow-v1", |_slot| SlowRunner)
        .unwrap();

    let storage = Arc::new(MemoryStorage::new());
    let notifier = Arc::new(RecordingNotifier::default());
    let ctx = Arc::new(AppContext::new(
        Repositories::memory(),
        registry.build(),
        storage.clone(),
        notifier.clone(),
        &settings,
    ));

    let manager = WorkerManager::new(ctx.clone(), &settings.workers);
    manager.start().await;

    let (maintenance, rx) = watch::channel(false);
    let loop_ctx = ctx.clone();
    tokio::spawn(async move {
        SchedulerUseCase::run_loop(&loop_ctx, time::Duration::milliseconds(10), 100, rx).await;
    });

    Harness {
        ctx,
        storage,
        notifier,
        manager,
        maintenance,
        loads,
        flaky_calls,
    }
}

impl Harness {
    async fn submit(&self, spec: JobSpec) -> JobId {
        self.ctx.job_lifecycle.submit(spec).await.unwrap().job.id
    }

    async fn wait_for(&self, job_id: JobId, done: impl Fn(&Job) -> bool) -> Job {
        for _ in 0..300 {
            let job = self.ctx.repos.job.get(job_id).await.unwrap().unwrap();
            if done(&job) {
                return job;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        panic!("job {job_id} did not reach the expected state");
    }

    async fn wait_terminal(&self, job_id: JobId) -> Job {
        self.wait_for(job_id, |job| job.state.is_terminal()).await
    }

    async fn stop(self) {
        self.manager.shutdown().await;
        let _ = self.maintenance.send(true);
    }
}

#[tokio::test]
async fn given_superres_job_when_processed_should_store_upscaled_image() {
    let harness = start(&["gpu-0"], 0).await;
    let job_id = harness
        .submit(JobSpec::new(
            "superres-x4",
            json!({"width": 2, "height": 1, "pixels_hex": "00ff"}),
        ))
        .await;

    let job = harness.wait_terminal(job_id).await;

    assert_eq!(job.state, JobState::Succeeded);
    let result = job.result.clone().unwrap();
    assert_eq!(result.metadata["size"], json!([8, 4]));
    let stored = harness.storage.get(&result.storage_key).await.unwrap();
    assert!(stored.starts_with(b"P5\n8 4\n255\n"));
    for stage in ["prepare", "infer", "postprocess", "storage"] {
        assert!(job.timings.contains_key(stage), "missing {stage}");
    }
    harness.stop().await;
}

#[tokio::test]
async fn given_concurrent_submits_with_same_key_when_processed_should_succeed_once() {
    let harness = Arc::new(start(&["gpu-0", "gpu-1"], 0).await);

    let mut tasks = Vec::new();
    for n in 0..2 {
        let harness = harness.clone();
        tasks.push(tokio::spawn(async move {
            harness
                .submit(
                    JobSpec::new("image-scoring-v1", json!({"width": 1, "height": 1, "pixels_hex": "80", "n": n}))
                        .with_dedup_key("k1"),
                )
                .await
        }));
    }
    let first = tasks.remove(0).await.unwrap();
    let second = tasks.remove(0).await.unwrap();

    let job = harness.wait_terminal(first).await;

    assert_eq!(first, second);
    assert_eq!(job.state, JobState::Succeeded);
    assert_eq!(job.attempt, 0);
    for stage in ["prepare", "infer", "postprocess"] {
        assert!(job.timings.contains_key(stage), "missing {stage}");
    }
    let result = job.result.unwrap();
    assert!(result.storage_key.ends_with(".json"));
    assert!(result.metadata["quality_assessment"].is_string());
    let Ok(harness) = Arc::try_unwrap(harness) else {
        panic!("harness still shared");
    };
    harness.stop().await;
}

#[tokio::test]
async fn given_registered_test_runner_when_jobs_processed_should_load_model_once_per_slot() {
    let harness = start(&["gpu-0"], 0).await;

    let first = harness
        .submit(JobSpec::new("echo-v1", json!({"prompt": "a"})))
        .await;
    let first = harness.wait_terminal(first).await;
    let second = harness
        .submit(JobSpec::new("echo-v1", json!({"prompt": "b"})))
        .await;
    let second = harness.wait_terminal(second).await;

    assert_eq!(first.state, JobState::Succeeded);
    assert_eq!(second.state, JobState::Succeeded);
    assert_eq!(harness.loads.load(Ordering::SeqCst), 1);
    assert!(first.timings.contains_key("load"));
    assert!(!second.timings.contains_key("load"));
    let key = second.result.unwrap().storage_key;
    assert!(key.ends_with(".txt"));
    assert_eq!(
        harness.storage.get(&key).await.unwrap(),
        json!({"prompt": "b"}).to_string().into_bytes()
    );
    harness.stop().await;
}

#[tokio::test]
async fn given_transient_failures_when_retried_should_succeed_with_monotonic_attempts() {
    let harness = start(&["gpu-0"], 2).await;
    let job_id = harness.submit(JobSpec::new("flaky-v1", json!({}))).await;

    let mut attempts = Vec::new();
    let mut job = harness.ctx.repos.job.get(job_id).await.unwrap().unwrap();
    for _ in 0..300 {
        job = harness.ctx.repos.job.get(job_id).await.unwrap().unwrap();
        attempts.push(job.attempt);
        if job.state.is_terminal() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }

    assert_eq!(job.state, JobState::Succeeded);
    assert_eq!(job.attempt, 2);
    assert!(attempts.windows(2).all(|pair| pair[0] <= pair[1]));
    assert!(job.failure.is_none());
    assert_eq!(job.result.unwrap().metadata["succeeded_on_call"], json!(3));
    assert_eq!(harness.flaky_calls.load(Ordering::SeqCst), 3);
    harness.stop().await;
}

#[tokio::test]
async fn given_persistent_transient_failure_when_cap_reached_should_fail_as_exhausted() {
    let harness = start(&["gpu-0"], u32::MAX).await;
    let job_id = harness.submit(JobSpec::new("flaky-v1", json!({}))).await;

    let job = harness.wait_terminal(job_id).await;

    assert_eq!(job.state, JobState::Failed);
    assert_eq!(job.attempt, 3);
    let failure = job.failure.unwrap();
    assert_eq!(failure.kind, FailureKind::ExhaustedRetries);
    assert!(failure.reason.contains("device reset"));
    harness.stop().await;
}

#[tokio::test]
async fn given_bad_raster_when_processed_should_fail_without_retry() {
    let harness = start(&["gpu-0"], 0).await;
    let job_id = harness
        .submit(JobSpec::new(
            "superres-x4",
            json!({"width": 3, "height": 1, "pixels_hex": "00"}),
        ))
        .await;

    let job = harness.wait_terminal(job_id).await;

    assert_eq!(job.state, JobState::Failed);
    assert_eq!(job.attempt, 1);
    assert_eq!(job.failure.unwrap().kind, FailureKind::InvalidInput);
    harness.stop().await;
}

#[tokio::test]
async fn given_running_job_when_canceled_should_stop_at_next_stage_boundary() {
    let harness = start(&["gpu-0"], 0).await;
    let job_id = harness.submit(JobSpec::new("slow-v1", json!({}))).await;
    harness
        .wait_for(job_id, |job| job.state == JobState::Running)
        .await;

    let flagged = CancelJobUseCase::execute(&harness.ctx, job_id).await.unwrap();
    let job = harness.wait_terminal(job_id).await;

    assert_eq!(flagged.state, JobState::Running);
    assert!(flagged.cancel_requested);
    assert_eq!(job.state, JobState::Canceled);
    assert!(job.result.is_none());
    harness.stop().await;
}

#[tokio::test]
async fn given_terminal_job_when_canceled_should_stay_unchanged() {
    let harness = start(&["gpu-0"], 0).await;
    let job_id = harness
        .submit(JobSpec::new("echo-v1", json!({"prompt": "done"})))
        .await;
    let finished = harness.wait_terminal(job_id).await;

    let err = CancelJobUseCase::execute(&harness.ctx, job_id)
        .await
        .unwrap_err();
    let after = harness.ctx.repos.job.get(job_id).await.unwrap().unwrap();

    assert_eq!(err, CancelJobError::AlreadyTerminal(JobState::Succeeded));
    assert_eq!(after.state, finished.state);
    assert_eq!(after.result, finished.result);
    assert_eq!(after.updated_at, finished.updated_at);
    harness.stop().await;
}

#[tokio::test]
async fn given_notify_target_when_job_finishes_should_send_status_once() {
    let harness = start(&["gpu-0", "gpu-1"], 0).await;
    let notifier = harness.notifier.clone();
    let job_id = harness
        .submit(
            JobSpec::new("echo-v1", json!({"prompt": "ping"}))
                .with_notify_target("https://callbacks.example/jobs"),
        )
        .await;
    let silent = harness
        .submit(JobSpec::new("echo-v1", json!({"prompt": "quiet"})))
        .await;

    harness.wait_terminal(job_id).await;
    harness.wait_terminal(silent).await;
    harness.stop().await;

    let sent = notifier.sent.lock().unwrap().clone();
    assert_eq!(sent.len(), 1);
    let (target, body) = &sent[0];
    assert_eq!(target, "https://callbacks.example/jobs");
    assert_eq!(body["job_id"], json!(job_id.to_string()));
    assert_eq!(body["state"], json!("succeeded"));
}
