//! Scheduler / Worker Loop (§4.9/§5): blocks on the input queue, runs a small
//! pool of cooperative per-job tasks, and lets the callback HTTP server run
//! concurrently. Also owns the stale-Pending sweep (SPEC_FULL.md §3).

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tracing::{error, info, warn};

use crate::kv::queue::Queue;
use crate::models::JobEnvelope;
use crate::pipeline::PipelineDriver;

pub struct Worker {
    pipeline: Arc<PipelineDriver>,
    input_queue: Arc<Queue>,
    concurrency: Arc<Semaphore>,
}

impl Worker {
    pub fn new(pipeline: Arc<PipelineDriver>, input_queue: Arc<Queue>, concurrency: usize) -> Self {
        Worker {
            pipeline,
            input_queue,
            concurrency: Arc::new(Semaphore::new(concurrency)),
        }
    }

    /// Runs until `shutdown` resolves. In-flight permits are allowed to drain
    /// (any job already past its validator enqueue has already persisted
    /// Pending state and released its own slot, so there is nothing further to
    /// wait for beyond the currently-running tier attempts).
    pub async fn run(&self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        info!("worker loop starting");
        loop {
            if *shutdown.borrow() {
                break;
            }

            let permit = match self.concurrency.clone().acquire_owned().await {
                Ok(p) => p,
                Err(_) => break,
            };

            // Block up to a second at a time so shutdown is checked promptly rather
            // than parking forever inside BLPOP.
            let popped = tokio::select! {
                res = self.input_queue.blocking_pop(1.0) => res,
                _ = shutdown.changed() => {
                    drop(permit);
                    break;
                }
            };

            let raw = match popped {
                Ok(Some(raw)) => raw,
                Ok(None) => {
                    drop(permit);
                    continue;
                }
                Err(e) => {
                    warn!(error = %e, "input queue pop failed, backing off");
                    drop(permit);
                    tokio::time::sleep(Duration::from_millis(500)).await;
                    continue;
                }
            };

            let pipeline = self.pipeline.clone();
            tokio::spawn(async move {
                let _permit = permit;
                Self::process_raw(pipeline, raw).await;
            });
        }
        info!("worker loop stopped accepting new pops");
    }

    async fn process_raw(pipeline: Arc<PipelineDriver>, raw: String) {
        let job: JobEnvelope = match serde_json::from_str(&raw) {
            Ok(j) => j,
            Err(e) => {
                // Cannot even identify a reply_to queue; this is dropped with a log,
                // matching §7's carve-out that a reply is only guaranteed when the
                // reply queue itself is known and reachable.
                error!(error = %e, "dropped unparseable job envelope");
                return;
            }
        };

        if let Err(e) = pipeline.handle_new_job(job.clone()).await {
            pipeline.handle_job_error(job, e).await;
        }
    }

    /// Proactively reconciles TTL-expired Pending states rather than waiting
    /// purely for a late callback to find nothing (SPEC_FULL.md §3). This does
    /// not need to inspect the KV store directly: Redis's own TTL eviction
    /// already deletes the key, so a late callback naturally gets `NotFound`.
    /// The sweep's job is to detect jobs that will never get a late callback at
    /// all and push them through the retry/exhaustion path promptly.
    pub fn spawn_sweep(
        pipeline: Arc<PipelineDriver>,
        interval: Duration,
        mut shutdown: tokio::sync::watch::Receiver<bool>,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = shutdown.changed() => break,
                }
                if *shutdown.borrow() {
                    break;
                }
                let handled = pipeline.sweep_expired().await;
                if handled > 0 {
                    info!(count = handled, "swept abandoned Pending Validation States");
                }
            }
        })
    }
}
