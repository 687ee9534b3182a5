pub mod idempotency_key;
pub mod job;

pub use idempotency_key::IdempotencyKeyRow;
pub use job::JobRow;
