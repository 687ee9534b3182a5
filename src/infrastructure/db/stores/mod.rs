pub mod idempotency_key_store;
pub mod job_store;
