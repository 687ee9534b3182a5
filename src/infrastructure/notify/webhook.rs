use crate::infrastructure::notify::{CompletionNotifier, NotifyError};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

/// POSTs the status body as JSON to `http(s)` targets.
pub struct HttpNotifier {
    client: reqwest::Client,
}

impl HttpNotifier {
    pub fn new(timeout: Duration) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NotifyError::Delivery(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl CompletionNotifier for HttpNotifier {
    async fn notify(&self, target: &str, body: &Value) -> Result<(), NotifyError> {
        // Step 1: Only web targets are delivered; other addresses are opaque to us.
        if !(target.starts_with("http://") || target.starts_with("https://")) {
            return Err(NotifyError::UnsupportedTarget(target.to_string()));
        }

        // Step 2: Send the request.
        let response = self
            .client
            .post(target)
            .json(body)
            .send()
            .await
            .map_err(|e| NotifyError::Delivery(e.to_string()))?;

        // Step 3: Treat non-2xx as a failed delivery.
        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::Status(status.as_u16()));
        }

        Ok(())
    }
}
