//! Provider Drivers: uniform adapters around individual OCR engines (§4.2).
//!
//! Every driver exposes the same capability — `extract(bytes, lang) -> candidate`
//! — and is asked at startup whether it is available on this host. Availability is
//! a boot-time probe, never a per-request check (§9).

pub mod apple_vision;
pub mod easyocr;
#[cfg(feature = "tier-llm")]
pub mod llm;
pub mod paddleocr;
pub mod tesseract;

use async_trait::async_trait;

use crate::models::Tier;

#[derive(Debug, Clone)]
pub struct Candidate {
    pub text: String,
    pub native_confidence: Option<f32>,
}

#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error("engine unavailable: {0}")]
    Unavailable(String),
    #[error("extraction failed: {0}")]
    ExtractionFailed(String),
}

#[async_trait]
pub trait OcrDriver: Send + Sync {
    fn tier(&self) -> Tier;

    /// Checked once at startup; drivers backed by a missing binary/library return
    /// `false` here rather than failing per-request.
    async fn is_available(&self) -> bool;

    async fn extract(&self, bytes: &[u8], lang: &str) -> Result<Candidate, DriverError>;
}

/// Strip NULs, normalize newlines, collapse runs of whitespace > 2 (§4.2).
pub fn normalize_text(raw: &str) -> String {
    let no_nul: String = raw.chars().filter(|&c| c != '\0').collect();
    let newlines_normalized = no_nul.replace("\r\n", "\n").replace('\r', "\n");

    let mut out = String::with_capacity(newlines_normalized.len());
    let mut run = 0usize;
    for c in newlines_normalized.chars() {
        if c == ' ' || c == '\t' {
            run += 1;
            if run <= 2 {
                out.push(' ');
            }
        } else {
            run = 0;
            out.push(c);
        }
    }
    out
}

pub fn normalize_confidence(raw: f32) -> f32 {
    raw.clamp(0.0, 1.0)
}

/// Constructs one driver instance per configured tier, regardless of whether
/// that tier turns out to be available — availability is decided later by
/// [`crate::tier_policy::ActiveTiers::resolve`], never here.
pub fn build_all(config: &crate::config::Config) -> Vec<std::sync::Arc<dyn OcrDriver>> {
    use std::sync::Arc;

    let mut drivers: Vec<Arc<dyn OcrDriver>> = Vec::new();
    for tier in &config.ocr_enabled_tiers {
        match tier {
            Tier::Tesseract => drivers.push(Arc::new(tesseract::TesseractDriver::new())),
            Tier::Paddleocr => drivers.push(Arc::new(paddleocr::PaddleOcrDriver::new(
                std::env::var("OCR_PADDLEOCR_MODEL_DIR").unwrap_or_else(|_| "/models/paddleocr".into()),
            ))),
            Tier::Easyocr => drivers.push(Arc::new(easyocr::EasyOcrDriver::new(
                std::env::var("OCR_EASYOCR_DETECTION_MODEL")
                    .unwrap_or_else(|_| "/models/easyocr/detection.rten".into())
                    .into(),
                std::env::var("OCR_EASYOCR_RECOGNITION_MODEL")
                    .unwrap_or_else(|_| "/models/easyocr/recognition.rten".into())
                    .into(),
            ))),
            Tier::AppleVision => drivers.push(Arc::new(apple_vision::AppleVisionDriver::new())),
            #[cfg(feature = "tier-llm")]
            Tier::LlmLocal => drivers.push(Arc::new(llm::LlmOcrDriver::new_local(
                &std::env::var("OCR_LLM_LOCAL_BASE_URL").unwrap_or_else(|_| "http://localhost:11434/v1".into()),
                &std::env::var("OCR_LLM_LOCAL_API_KEY").unwrap_or_else(|_| "not-needed".into()),
                &std::env::var("OCR_LLM_LOCAL_MODEL").unwrap_or_else(|_| "llava".into()),
            ))),
            #[cfg(feature = "tier-llm")]
            Tier::LlmCloud => drivers.push(Arc::new(llm::LlmOcrDriver::new_cloud(
                &std::env::var("OCR_LLM_CLOUD_BASE_URL").unwrap_or_else(|_| "https://api.openai.com/v1".into()),
                &std::env::var("OCR_LLM_CLOUD_API_KEY").unwrap_or_default(),
                &std::env::var("OCR_LLM_CLOUD_MODEL").unwrap_or_else(|_| "gpt-4o-mini".into()),
            ))),
            #[cfg(not(feature = "tier-llm"))]
            Tier::LlmLocal | Tier::LlmCloud => {}
        }
    }
    drivers
}
