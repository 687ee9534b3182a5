pub mod cancel_job;
pub mod claim_next_job;
pub mod get_job;
pub mod heartbeat_job;
pub mod notify_completion;
pub mod queue_due_jobs;
pub mod recover_queue;
pub mod requeue_expired_leases;
pub mod run_worker_once;
pub mod scheduler;
pub mod submit_job;
pub mod worker_loop;
pub mod worker_manager;
