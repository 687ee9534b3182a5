// Use case: worker_manager.

use crate::application::context::AppContext;
use crate::application::usecases::run_worker_once::{WorkerConfig, WorkerSlot};
use crate::application::usecases::worker_loop::WorkerLoopUseCase;
use crate::config::Workers;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

struct WorkerHandle {
    slot_id: String,
    shutdown: tokio::sync::watch::Sender<bool>,
    join: tokio::task::JoinHandle<()>,
}

/// Runs one worker per configured slot for the life of the process.
pub struct WorkerManager {
    ctx: Arc<AppContext>,
    config: WorkerConfig,
    slots: Vec<String>,
    handles: Mutex<Vec<WorkerHandle>>,
}

impl WorkerManager {
    /// Build a manager from application settings.
    pub fn new(ctx: Arc<AppContext>, settings: &Workers) -> Self {
        Self {
            ctx,
            config: WorkerConfig::from_settings(settings),
            slots: settings.slots.clone(),
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Spawn a worker for every slot not already running.
    pub async fn start(&self) {
        let mut handles = self.handles.lock().await;
        for slot_id in &self.slots {
            if handles.iter().any(|h| &h.slot_id == slot_id) {
                continue;
            }
            handles.push(self.spawn_worker(slot_id));
        }
        info!(workers = handles.len(), "worker_pool_started");
    }

    pub async fn worker_count(&self) -> usize {
        self.handles.lock().await.len()
    }

    /// Signal every worker and wait for in-flight jobs to finish.
    pub async fn shutdown(&self) {
        let handles: Vec<WorkerHandle> = self.handles.lock().await.drain(..).collect();

        // Step 1: Signal all workers first so they stop together.
        for handle in &handles {
            let _ = handle.shutdown.send(true);
        }

        // Step 2: Wait for each to release its slot.
        for handle in handles {
            let _ = handle.join.await;
        }
        info!("worker_pool_stopped");
    }

    fn spawn_worker(&self, slot_id: &str) -> WorkerHandle {
        let (tx, rx) = tokio::sync::watch::channel(false);

        let ctx = self.ctx.clone();
        let config = self.config.clone();
        let slot = WorkerSlot::new(slot_id);
        let join = tokio::spawn(async move {
            WorkerLoopUseCase::run(&ctx, slot, &config, rx).await;
        });

        WorkerHandle {
            slot_id: slot_id.to_string(),
            shutdown: tx,
            join,
        }
    }
}
