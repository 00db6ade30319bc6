//! Local fast-path engine backed by `paddle-ocr-rs`.

use async_trait::async_trait;

use super::{normalize_confidence, normalize_text, Candidate, DriverError, OcrDriver};
use crate::models::Tier;

#[cfg(feature = "tier-paddleocr")]
pub struct PaddleOcrDriver {
    model_dir: std::path::PathBuf,
}

#[cfg(not(feature = "tier-paddleocr"))]
pub struct PaddleOcrDriver;

impl PaddleOcrDriver {
    #[cfg(feature = "tier-paddleocr")]
    pub fn new(model_dir: impl Into<std::path::PathBuf>) -> Self {
        PaddleOcrDriver {
            model_dir: model_dir.into(),
        }
    }

    #[cfg(not(feature = "tier-paddleocr"))]
    pub fn new(_model_dir: impl Into<std::path::PathBuf>) -> Self {
        PaddleOcrDriver
    }
}

#[async_trait]
impl OcrDriver for PaddleOcrDriver {
    fn tier(&self) -> Tier {
        Tier::Paddleocr
    }

    async fn is_available(&self) -> bool {
        #[cfg(feature = "tier-paddleocr")]
        {
            self.model_dir.is_dir()
        }
        #[cfg(not(feature = "tier-paddleocr"))]
        {
            false
        }
    }

    #[cfg(feature = "tier-paddleocr")]
    async fn extract(&self, bytes: &[u8], _lang: &str) -> Result<Candidate, DriverError> {
        let bytes = bytes.to_vec();
        let model_dir = self.model_dir.clone();
        tokio::task::spawn_blocking(move || {
            let img = image::load_from_memory(&bytes)
                .map_err(|e| DriverError::ExtractionFailed(e.to_string()))?;
            let mut engine = paddle_ocr_rs::ocr_lite::OcrLite::new();
            engine
                .init_models(
                    &model_dir.join("det.onnx"),
                    &model_dir.join("cls.onnx"),
                    &model_dir.join("rec.onnx"),
                    &model_dir.join("keys.txt"),
                    num_cpus_hint(),
                )
                .map_err(|e| DriverError::Unavailable(e.to_string()))?;
            let result = engine
                .detect(&img, 50, 1024, 0.5, 0.3, 1.6, true, false)
                .map_err(|e| DriverError::ExtractionFailed(e.to_string()))?;
            let joined = result
                .text_blocks
                .iter()
                .map(|b| b.text.clone())
                .collect::<Vec<_>>()
                .join("\n");
            let avg_conf = if result.text_blocks.is_empty() {
                None
            } else {
                let sum: f32 = result.text_blocks.iter().map(|b| b.score).sum();
                Some(normalize_confidence(sum / result.text_blocks.len() as f32))
            };
            Ok(Candidate {
                text: normalize_text(&joined),
                native_confidence: avg_conf,
            })
        })
        .await
        .map_err(|e| DriverError::ExtractionFailed(e.to_string()))?
    }

    #[cfg(not(feature = "tier-paddleocr"))]
    async fn extract(&self, _bytes: &[u8], _lang: &str) -> Result<Candidate, DriverError> {
        Err(DriverError::Unavailable("built without tier-paddleocr".into()))
    }
}

#[cfg(feature = "tier-paddleocr")]
fn num_cpus_hint() -> u32 {
    std::thread::available_parallelism()
        .map(|n| n.get() as u32)
        .unwrap_or(1)
}
