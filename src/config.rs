//! Environment-driven configuration, loaded once at startup.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use tracing::{info, warn};

use crate::models::Tier;

#[derive(Debug, Clone)]
pub struct Config {
    pub redis_url: String,
    pub input_queue: String,
    pub validator_queue: String,
    pub callback_base_url: String,
    pub callback_bind_addr: String,

    pub ocr_max_text_bytes: usize,
    pub ocr_max_attempts: u32,
    pub ocr_language_default: String,
    pub ocr_validation_model: String,
    pub ocr_min_confidence: Option<f32>,
    pub ocr_enabled_tiers: Vec<Tier>,
    pub pending_state_ttl_secs: u64,
    pub per_tier_timeout_secs: u64,

    pub local_images_root: PathBuf,

    pub s3_endpoint: Option<String>,
    pub s3_region: Option<String>,
    pub s3_path_style: bool,

    pub worker_concurrency: usize,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let redis_url = req_env("OCR_REDIS_URL")?;
        let input_queue = env_or("OCR_INPUT_QUEUE", "jarvis.ocr.jobs");
        let validator_queue = env_or("OCR_VALIDATOR_QUEUE", "jarvis.validator.jobs");
        let callback_base_url = req_env("OCR_CALLBACK_BASE_URL")?;
        let callback_bind_addr = env_or("OCR_CALLBACK_BIND_ADDR", "0.0.0.0:8088");

        let ocr_max_text_bytes = env_parse("OCR_MAX_TEXT_BYTES", 51_200usize)?;
        let ocr_max_attempts = env_parse("OCR_MAX_ATTEMPTS", 3u32)?;
        let ocr_language_default = env_or("OCR_LANGUAGE_DEFAULT", "en");
        let ocr_validation_model = env_or("OCR_VALIDATION_MODEL", "llm_local_light");
        let ocr_min_confidence = match std::env::var("OCR_MIN_CONFIDENCE") {
            Ok(v) if !v.trim().is_empty() => Some(
                v.trim()
                    .parse::<f32>()
                    .context("OCR_MIN_CONFIDENCE must be a number")?,
            ),
            _ => None,
        };

        let tiers_raw = env_or(
            "OCR_ENABLED_TIERS",
            "tesseract,easyocr,paddleocr,apple_vision,llm_local,llm_cloud",
        );
        let mut ocr_enabled_tiers = Vec::new();
        for part in tiers_raw.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            match Tier::parse(part) {
                Some(t) => ocr_enabled_tiers.push(t),
                None => warn!(tier = part, "ignoring unknown tier in OCR_ENABLED_TIERS"),
            }
        }
        if ocr_enabled_tiers.is_empty() {
            bail!("OCR_ENABLED_TIERS resolved to an empty list");
        }

        let pending_state_ttl_secs = env_parse("OCR_PENDING_STATE_TTL_SECS", 600u64)?;
        let per_tier_timeout_secs = env_parse("OCR_TIER_TIMEOUT_SECS", 60u64)?;

        let local_images_root = PathBuf::from(env_or("OCR_LOCAL_IMAGES_ROOT", "/data/images"))
            .canonicalize()
            .unwrap_or_else(|_| PathBuf::from(env_or("OCR_LOCAL_IMAGES_ROOT", "/data/images")));

        let s3_endpoint = std::env::var("OCR_S3_ENDPOINT").ok().filter(|s| !s.is_empty());
        let s3_region = std::env::var("OCR_S3_REGION").ok().filter(|s| !s.is_empty());
        let s3_path_style = env_parse("OCR_S3_PATH_STYLE", true)?;

        let worker_concurrency = env_parse("OCR_WORKER_CONCURRENCY", 8usize)?;

        let cfg = Config {
            redis_url,
            input_queue,
            validator_queue,
            callback_base_url,
            callback_bind_addr,
            ocr_max_text_bytes,
            ocr_max_attempts,
            ocr_language_default,
            ocr_validation_model,
            ocr_min_confidence,
            ocr_enabled_tiers,
            pending_state_ttl_secs,
            per_tier_timeout_secs,
            local_images_root,
            s3_endpoint,
            s3_region,
            s3_path_style,
            worker_concurrency,
        };

        info!(
            tiers = ?cfg.ocr_enabled_tiers.iter().map(Tier::as_str).collect::<Vec<_>>(),
            max_attempts = cfg.ocr_max_attempts,
            ttl_secs = cfg.pending_state_ttl_secs,
            "configuration loaded"
        );

        Ok(cfg)
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn req_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("missing required env var {key}"))
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(v) => v
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("invalid value for {key}: {e}")),
        Err(_) => Ok(default),
    }
}
