//! Local fast-path engine bound to the system `tesseract` library.

use async_trait::async_trait;

use super::{normalize_text, Candidate, DriverError, OcrDriver};
use crate::models::Tier;

pub struct TesseractDriver;

impl TesseractDriver {
    pub fn new() -> Self {
        TesseractDriver
    }
}

#[async_trait]
impl OcrDriver for TesseractDriver {
    fn tier(&self) -> Tier {
        Tier::Tesseract
    }

    async fn is_available(&self) -> bool {
        #[cfg(feature = "tier-tesseract")]
        {
            tokio::task::spawn_blocking(|| {
                ::tesseract::Tesseract::new(None, Some("eng")).is_ok()
            })
            .await
            .unwrap_or(false)
        }
        #[cfg(not(feature = "tier-tesseract"))]
        {
            false
        }
    }

    #[cfg(feature = "tier-tesseract")]
    async fn extract(&self, bytes: &[u8], lang: &str) -> Result<Candidate, DriverError> {
        let bytes = bytes.to_vec();
        let lang = lang.to_string();
        tokio::task::spawn_blocking(move || {
            let mut tess = ::tesseract::Tesseract::new(None, Some(&lang))
                .map_err(|e| DriverError::Unavailable(e.to_string()))?
                .set_image_from_mem(&bytes)
                .map_err(|e| DriverError::ExtractionFailed(e.to_string()))?;
            let text = tess
                .get_text()
                .map_err(|e| DriverError::ExtractionFailed(e.to_string()))?;
            Ok(Candidate {
                text: normalize_text(&text),
                native_confidence: None,
            })
        })
        .await
        .map_err(|e| DriverError::ExtractionFailed(e.to_string()))?
    }

    #[cfg(not(feature = "tier-tesseract"))]
    async fn extract(&self, _bytes: &[u8], _lang: &str) -> Result<Candidate, DriverError> {
        Err(DriverError::Unavailable("built without tier-tesseract".into()))
    }
}
