//! Durable FIFO queue on top of a Redis list: `LPUSH` to the tail is modeled as
//! `RPUSH`, blocking consumers pop from the head with `BLPOP`.

use anyhow::{Context, Result};
use redis::AsyncCommands;

use super::Kv;

#[derive(Clone)]
pub struct Queue {
    kv: Kv,
    name: String,
}

impl Queue {
    pub fn new(kv: Kv, name: impl Into<String>) -> Self {
        Queue {
            kv,
            name: name.into(),
        }
    }

    /// Push a raw JSON payload to the tail of the queue.
    pub async fn push(&self, payload: &str) -> Result<()> {
        let mut conn = self.kv.conn.clone();
        conn.rpush::<_, _, ()>(&self.name, payload)
            .await
            .context("queue push failed")?;
        Ok(())
    }

    /// Block up to `timeout_secs` waiting for an item at the head; `0` blocks
    /// indefinitely, matching Redis `BLPOP` semantics.
    pub async fn blocking_pop(&self, timeout_secs: f64) -> Result<Option<String>> {
        let mut conn = self.kv.conn.clone();
        let result: Option<(String, String)> = conn
            .blpop(&self.name, timeout_secs)
            .await
            .context("queue blocking pop failed")?;
        Ok(result.map(|(_key, value)| value))
    }

    /// Approximate depth, used only for logs/liveness, not for correctness.
    pub async fn len(&self) -> Result<u64> {
        let mut conn = self.kv.conn.clone();
        let len: u64 = conn.llen(&self.name).await.context("queue len failed")?;
        Ok(len)
    }
}
