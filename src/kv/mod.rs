//! The backing key-value store: a durable FIFO queue and the Pending Validation
//! State store, both backed by the same Redis connection, per §4.4/§6.

pub mod queue;
pub mod state_store;

use anyhow::{Context, Result};
use redis::aio::ConnectionManager;

/// Shared Redis handle cloned cheaply into the queue and state-store wrappers.
#[derive(Clone)]
pub struct Kv {
    pub(crate) conn: ConnectionManager,
}

impl Kv {
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url).context("invalid redis url")?;
        let conn = ConnectionManager::new(client)
            .await
            .context("failed to establish redis connection manager")?;
        Ok(Kv { conn })
    }
}
