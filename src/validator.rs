//! Validator Client (§4.3): enqueues a validation request to the external LLM
//! proxy's job queue and records the correlation id under which the Pending
//! Validation State is stored so the eventual callback can be matched back.

use anyhow::{Context, Result};

use crate::kv::queue::Queue;
use crate::models::ValidationRequest;

pub struct ValidatorClient {
    queue: Queue,
    callback_base_url: String,
    model_hint: String,
}

impl ValidatorClient {
    pub fn new(queue: Queue, callback_base_url: String, model_hint: String) -> Self {
        ValidatorClient {
            queue,
            callback_base_url,
            model_hint,
        }
    }

    /// Enqueue is job-level transient on failure (§4.3) — callers propagate the
    /// error as a retryable job-level error, not a per-image one.
    pub async fn enqueue(&self, correlation_id: &str, candidate_text: &str) -> Result<()> {
        let request = ValidationRequest {
            candidate_text: candidate_text.to_string(),
            callback_url: format!("{}/internal/validation/callback", self.callback_base_url),
            correlation_id: correlation_id.to_string(),
            model_hint: Some(self.model_hint.clone()),
        };
        let payload = serde_json::to_string(&request).context("serializing validation request")?;
        self.queue
            .push(&payload)
            .await
            .context("validator enqueue failed")?;
        Ok(())
    }
}
