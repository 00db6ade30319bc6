//! Native-OS vision tier. No Rust binding onto Apple's Vision framework is
//! available; this shells out to a probed external helper binary the same way
//! the teacher drives `ocrmypdf` via `tokio::process::Command`. Platform-gated:
//! absent from the active tier list on any non-macOS host (§4.2).

use async_trait::async_trait;
use tokio::process::Command;

use super::{normalize_text, Candidate, DriverError, OcrDriver};
use crate::models::Tier;

const HELPER_BIN: &str = "jarvis-vision-ocr";

pub struct AppleVisionDriver {
    helper_path: Option<std::path::PathBuf>,
}

impl AppleVisionDriver {
    pub fn new() -> Self {
        AppleVisionDriver {
            helper_path: which::which(HELPER_BIN).ok(),
        }
    }
}

#[async_trait]
impl OcrDriver for AppleVisionDriver {
    fn tier(&self) -> Tier {
        Tier::AppleVision
    }

    async fn is_available(&self) -> bool {
        cfg!(target_os = "macos") && self.helper_path.is_some()
    }

    async fn extract(&self, bytes: &[u8], lang: &str) -> Result<Candidate, DriverError> {
        if !cfg!(target_os = "macos") {
            return Err(DriverError::Unavailable("not running on macOS".into()));
        }
        let helper = self
            .helper_path
            .as_ref()
            .ok_or_else(|| DriverError::Unavailable(format!("{HELPER_BIN} not found on PATH")))?;

        let tmp = tempfile_path();
        tokio::fs::write(&tmp, bytes)
            .await
            .map_err(|e| DriverError::ExtractionFailed(e.to_string()))?;

        let output = Command::new(helper)
            .arg("--lang")
            .arg(lang)
            .arg(&tmp)
            .output()
            .await
            .map_err(|e| DriverError::ExtractionFailed(e.to_string()));

        let _ = tokio::fs::remove_file(&tmp).await;

        let output = output?;
        if !output.status.success() {
            return Err(DriverError::ExtractionFailed(format!(
                "helper exited with {:?}",
                output.status.code()
            )));
        }
        let text = String::from_utf8_lossy(&output.stdout);
        Ok(Candidate {
            text: normalize_text(&text),
            native_confidence: None,
        })
    }
}

fn tempfile_path() -> std::path::PathBuf {
    std::env::temp_dir().join(format!("jarvis-ocr-{}.bin", uuid::Uuid::new_v4()))
}
