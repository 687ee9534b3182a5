pub mod db;
pub mod notify;
pub mod observability;
pub mod queue;
pub mod storage;
