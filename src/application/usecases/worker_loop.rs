// Use case: worker_loop.

use crate::application::context::AppContext;
use crate::application::usecases::run_worker_once::{RunWorkerOnceUseCase, WorkerConfig, WorkerSlot};
use tracing::{error, info};

/// Runs one slot's worker until a shutdown signal is received.
pub struct WorkerLoopUseCase;

impl WorkerLoopUseCase {
    /// Process jobs one at a time on `slot`.
    ///
    /// A job in flight is finished before shutdown is honoured; the warm
    /// runner is unloaded on exit.
    pub async fn run(
        ctx: &AppContext,
        mut slot: WorkerSlot,
        config: &WorkerConfig,
        mut shutdown: tokio::sync::watch::Receiver<bool>,
    ) {
        info!(slot = %slot.id(), "worker_started");

        // Step 1: Loop until the shutdown signal is triggered.
        loop {
            if *shutdown.borrow() {
                break;
            }

            // Step 2: Process one job; the claim waits at most one poll interval.
            let result = RunWorkerOnceUseCase::execute(ctx, &mut slot, config).await;

            // Step 3: Back off after a storage error instead of spinning.
            if let Err(e) = result {
                error!(slot = %slot.id(), error = ?e, "worker_iteration_failed");
                let pause = std::time::Duration::from_millis(
                    config.poll_interval.whole_milliseconds().max(0) as u64,
                );
                tokio::select! {
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                    _ = tokio::time::sleep(pause) => {}
                }
            }
        }

        // Step 4: Release the slot.
        slot.release().await;
        info!(slot = %slot.id(), "worker_stopped");
    }
}
