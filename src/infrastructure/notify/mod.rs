pub mod webhook;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

pub use webhook::HttpNotifier;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NotifyError {
    #[error("unsupported notification target: {0}")]
    UnsupportedTarget(String),

    #[error("delivery failed: {0}")]
    Delivery(String),

    #[error("target responded with status {0}")]
    Status(u16),
}

/// Sends a job's final status to the address the caller supplied.
#[async_trait]
pub trait CompletionNotifier: Send + Sync {
    async fn notify(&self, target: &str, body: &Value) -> Result<(), NotifyError>;
}

/// Drops every notification.
pub struct DisabledNotifier;

#[async_trait]
impl CompletionNotifier for DisabledNotifier {
    async fn notify(&self, _target: &str, _body: &Value) -> Result<(), NotifyError> {
        Ok(())
    }
}
