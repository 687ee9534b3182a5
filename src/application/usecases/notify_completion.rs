// Use case: notify_completion.

use crate::application::context::AppContext;
use crate::application::usecases::get_job::JobStatusView;
use crate::domain::entities::job::Job;
use metrics::counter;
use tracing::{info, warn};

/// Sends a finished job's status to its notification target, best effort.
pub struct NotifyCompletionUseCase;

impl NotifyCompletionUseCase {
    /// Returns `true` when a notification was delivered.
    pub async fn execute(ctx: &AppContext, job: &Job) -> bool {
        // Step 1: Only terminal jobs with a target are announced.
        let Some(target) = job.notify_target.as_deref() else {
            return false;
        };
        if !job.state.is_terminal() {
            return false;
        }

        // Step 2: Deliver; failures never affect the job.
        let body = JobStatusView::from_job(job).to_value();
        match ctx.notifier.notify(target, &body).await {
            Ok(()) => {
                counter!("notifications_sent_total").increment(1);
                info!(job_id = %job.id, target, "job_notification_sent");
                true
            }
            Err(e) => {
                counter!("notifications_failed_total").increment(1);
                warn!(job_id = %job.id, target, error = %e, "job_notification_failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::NotifyCompletionUseCase;
    use crate::application::context::AppContext;
    use crate::application::context::test_support::{builtin_registry, test_settings};
    use crate::domain::entities::job::{Failure, FailureKind, Job, JobSpec};
    use crate::domain::value_objects::ids::JobId;
    use crate::domain::value_objects::timestamps::Timestamp;
    use crate::infrastructure::db::repositories::Repositories;
    use crate::infrastructure::notify::{CompletionNotifier, NotifyError};
    use crate::infrastructure::storage::MemoryStorage;
    use async_trait::async_trait;
    use serde_json::{Value, json};
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Recorder {
        sent: Mutex<Vec<(String, Value)>>,
    }

    #[async_trait]
    impl CompletionNotifier for Recorder {
        async fn notify(&self, target: &str, body: &Value) -> Result<(), NotifyError> {
            self.sent
                .lock()
                .unwrap()
                .push((target.to_string(), body.clone()));
            Ok(())
        }
    }

    fn context(recorder: Arc<Recorder>) -> AppContext {
        AppContext::new(
            Repositories::memory(),
            builtin_registry(),
            Arc::new(MemoryStorage::new()),
            recorder,
            &test_settings(),
        )
    }

    fn job(target: Option<&str>) -> Job {
        let mut spec = JobSpec::new("superres-x4", json!({}));
        if let Some(target) = target {
            spec = spec.with_notify_target(target);
        }
        Job::admit(JobId::new(), spec, Timestamp::now_utc())
    }

    #[tokio::test]
    async fn given_terminal_job_with_target_when_execute_should_send_status() {
        let recorder = Arc::new(Recorder::default());
        let ctx = context(recorder.clone());
        let mut job = job(Some("https://hooks.example/done"));
        job.reject(
            Failure::new(FailureKind::UnknownJobType, "missing"),
            Timestamp::now_utc(),
        )
        .unwrap();

        assert!(NotifyCompletionUseCase::execute(&ctx, &job).await);

        let sent = recorder.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "https://hooks.example/done");
        assert_eq!(sent[0].1["state"], "failed");
    }

    #[tokio::test]
    async fn given_pending_job_or_no_target_when_execute_should_skip() {
        let recorder = Arc::new(Recorder::default());
        let ctx = context(recorder.clone());

        assert!(!NotifyCompletionUseCase::execute(&ctx, &job(Some("https://x"))).await);
        assert!(!NotifyCompletionUseCase::execute(&ctx, &job(None)).await);
        assert!(recorder.sent.lock().unwrap().is_empty());
    }
}
