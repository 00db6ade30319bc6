//! Reply Emitter (§4.7): serializes the completion envelope and pushes it to
//! the caller-specified `reply_to` queue.

use anyhow::{Context, Result};
use tracing::info;

use crate::kv::queue::Queue;
use crate::kv::Kv;
use crate::models::{CompletionEnvelope, JobEnvelope};

pub struct ReplyEmitter {
    kv: Kv,
}

impl ReplyEmitter {
    pub fn new(kv: Kv) -> Self {
        ReplyEmitter { kv }
    }

    /// Exactly-once emit is not guaranteed; downstream consumers must be
    /// idempotent on `(job_id, workflow_id)` (§4.7).
    pub async fn emit(&self, job: &JobEnvelope, envelope: CompletionEnvelope) -> Result<()> {
        let payload = serde_json::to_string(&envelope).context("serializing completion envelope")?;
        let reply_queue = Queue::new(self.kv.clone(), job.reply_to.clone());
        reply_queue
            .push(&payload)
            .await
            .context("reply emit failed")?;
        info!(
            job_id = %job.job_id,
            reply_to = %job.reply_to,
            status = ?envelope.payload.status,
            "completion emitted"
        );
        Ok(())
    }
}
