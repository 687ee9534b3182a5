use std::sync::Arc;

use crate::config::Settings;
use crate::domain::runners::RunnerRegistry;
use crate::domain::services::job_lifecycle::{
    JobLifecycle, JobLifecycleService, LifecycleSettings,
};
use crate::domain::workflows::retry_policy::RetryPolicy;
use crate::infrastructure::db::repositories::Repositories;
use crate::infrastructure::notify::CompletionNotifier;
use crate::infrastructure::queue::PriorityDispatchQueue;
use crate::infrastructure::storage::ObjectStorage;
use time::Duration;

/// Shared application resources used by use cases and services.
pub struct AppContext {
    pub repos: Repositories,
    pub job_lifecycle: Arc<dyn JobLifecycleService>,
    pub queue: Arc<PriorityDispatchQueue>,
    pub registry: Arc<RunnerRegistry>,
    pub storage: Arc<dyn ObjectStorage>,
    pub notifier: Arc<dyn CompletionNotifier>,
}

impl AppContext {
    /// Build a new application context with shared repositories and services.
    pub fn new(
        repos: Repositories,
        registry: Arc<RunnerRegistry>,
        storage: Arc<dyn ObjectStorage>,
        notifier: Arc<dyn CompletionNotifier>,
        settings: &Settings,
    ) -> Self {
        let queue = Arc::new(PriorityDispatchQueue::new(settings.queue.starvation_limit));
        let job_lifecycle = Arc::new(JobLifecycle::new(
            repos.clone(),
            queue.clone(),
            registry.clone(),
            lifecycle_settings(settings),
        ));

        Self {
            repos,
            job_lifecycle,
            queue,
            registry,
            storage,
            notifier,
        }
    }
}

/// Map loaded settings onto the lifecycle's knobs.
pub fn lifecycle_settings(settings: &Settings) -> LifecycleSettings {
    LifecycleSettings {
        max_payload_bytes: settings.queue.max_payload_bytes,
        idempotency_ttl: Duration::seconds(settings.idempotency.ttl_seconds as i64),
        visibility_timeout: Duration::milliseconds(settings.workers.visibility_timeout_ms as i64),
        retry_policy: RetryPolicy {
            max_attempts: settings.retry.max_attempts,
            base_delay_ms: settings.retry.base_delay_ms,
            max_delay_ms: settings.retry.max_delay_ms,
            jitter_ms: settings.retry.jitter_ms,
        },
    }
}
