pub mod callback;
pub mod config;
pub mod drivers;
pub mod errors;
pub mod health;
pub mod kv;
pub mod models;
pub mod pipeline;
pub mod reply;
pub mod resolver;
pub mod tier_policy;
pub mod validator;
pub mod worker;

use std::sync::Arc;

use anyhow::Result;

use crate::config::Config;
use crate::kv::queue::Queue;
use crate::kv::state_store::StateStore;
use crate::kv::Kv;
use crate::pipeline::PipelineDriver;
use crate::reply::ReplyEmitter;
use crate::resolver::ImageResolver;
use crate::tier_policy::ActiveTiers;
use crate::validator::ValidatorClient;

/// Assembles the process-wide singleton (§9 "Shared mutable global state"):
/// one `ActiveTiers`, one `PipelineDriver`, built once at startup and never
/// re-initialized between jobs.
pub async fn build_pipeline(config: &Config) -> Result<Arc<PipelineDriver>> {
    let kv = Kv::connect(&config.redis_url).await?;

    let resolver = Arc::new(ImageResolver::new(config, None).await);
    let all_drivers = drivers::build_all(config);
    let active_tiers = Arc::new(ActiveTiers::resolve(&config.ocr_enabled_tiers, all_drivers).await?);

    let validator_queue = Queue::new(kv.clone(), config.validator_queue.clone());
    let validator = Arc::new(ValidatorClient::new(
        validator_queue,
        config.callback_base_url.clone(),
        config.ocr_validation_model.clone(),
    ));

    let state_store = Arc::new(StateStore::new(kv.clone()));
    let reply_emitter = Arc::new(ReplyEmitter::new(kv.clone()));
    let input_queue = Arc::new(Queue::new(kv.clone(), config.input_queue.clone()));

    Ok(Arc::new(PipelineDriver {
        resolver,
        active_tiers,
        validator,
        state_store,
        reply_emitter,
        input_queue,
        max_text_bytes: config.ocr_max_text_bytes,
        max_attempts: config.ocr_max_attempts,
        min_confidence: config.ocr_min_confidence,
        language_default: config.ocr_language_default.clone(),
        pending_ttl_secs: config.pending_state_ttl_secs,
        tier_timeout: std::time::Duration::from_secs(config.per_tier_timeout_secs),
    }))
}
