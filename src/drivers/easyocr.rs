//! Local model-based engine. No literal `easyocr` crate exists in the Rust
//! ecosystem; this tier is served by the pure-Rust `ocrs` + `rten` detection/
//! recognition pipeline, the closest available local engine (documented as a
//! substitution in DESIGN.md).

use async_trait::async_trait;

use super::{normalize_text, Candidate, DriverError, OcrDriver};
use crate::models::Tier;

#[cfg(feature = "tier-easyocr")]
pub struct EasyOcrDriver {
    detection_model: std::path::PathBuf,
    recognition_model: std::path::PathBuf,
}

#[cfg(not(feature = "tier-easyocr"))]
pub struct EasyOcrDriver;

impl EasyOcrDriver {
    #[cfg(feature = "tier-easyocr")]
    pub fn new(detection_model: std::path::PathBuf, recognition_model: std::path::PathBuf) -> Self {
        EasyOcrDriver {
            detection_model,
            recognition_model,
        }
    }

    #[cfg(not(feature = "tier-easyocr"))]
    pub fn new(_detection_model: std::path::PathBuf, _recognition_model: std::path::PathBuf) -> Self {
        EasyOcrDriver
    }
}

#[async_trait]
impl OcrDriver for EasyOcrDriver {
    fn tier(&self) -> Tier {
        Tier::Easyocr
    }

    async fn is_available(&self) -> bool {
        #[cfg(feature = "tier-easyocr")]
        {
            self.detection_model.is_file() && self.recognition_model.is_file()
        }
        #[cfg(not(feature = "tier-easyocr"))]
        {
            false
        }
    }

    #[cfg(feature = "tier-easyocr")]
    async fn extract(&self, bytes: &[u8], _lang: &str) -> Result<Candidate, DriverError> {
        let bytes = bytes.to_vec();
        let detection_model = self.detection_model.clone();
        let recognition_model = self.recognition_model.clone();
        tokio::task::spawn_blocking(move || {
            let img = image::load_from_memory(&bytes)
                .map_err(|e| DriverError::ExtractionFailed(e.to_string()))?
                .into_rgb8();

            let det_model = rten::Model::load_file(&detection_model)
                .map_err(|e| DriverError::Unavailable(e.to_string()))?;
            let rec_model = rten::Model::load_file(&recognition_model)
                .map_err(|e| DriverError::Unavailable(e.to_string()))?;
            let engine = ocrs::OcrEngine::new(ocrs::OcrEngineParams {
                detection_model: Some(det_model),
                recognition_model: Some(rec_model),
                ..Default::default()
            })
            .map_err(|e| DriverError::Unavailable(e.to_string()))?;

            let ocr_input = engine
                .prepare_input(img.view())
                .map_err(|e| DriverError::ExtractionFailed(e.to_string()))?;
            let lines = engine
                .get_text(&ocr_input)
                .map_err(|e| DriverError::ExtractionFailed(e.to_string()))?;

            Ok(Candidate {
                text: normalize_text(&lines),
                native_confidence: None,
            })
        })
        .await
        .map_err(|e| DriverError::ExtractionFailed(e.to_string()))?
    }

    #[cfg(not(feature = "tier-easyocr"))]
    async fn extract(&self, _bytes: &[u8], _lang: &str) -> Result<Candidate, DriverError> {
        Err(DriverError::Unavailable("built without tier-easyocr".into()))
    }
}
