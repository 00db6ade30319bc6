//! Error taxonomy for the OCR pipeline.
//!
//! Every error carries a stable `code()` used both in the completion envelope's
//! `payload.error.code` / `results[i].error.code` and in log lines, so operators can
//! grep for the same string the caller sees.

use thiserror::Error;

/// Per-image failures: captured in `results[i].error`, never bubble up the job.
#[derive(Error, Debug, Clone)]
pub enum ImageError {
    #[error("image reference could not be resolved")]
    ImageNotFound,

    #[error("unsupported media type: {detail}")]
    UnsupportedMedia { detail: String },

    #[error("OCR engine failed on every tier: {detail}")]
    OcrEngineError { detail: String },

    #[error("no tier produced validator-accepted output")]
    OcrNoValidOutput,
}

impl ImageError {
    pub fn code(&self) -> &'static str {
        match self {
            ImageError::ImageNotFound => "image_not_found",
            ImageError::UnsupportedMedia { .. } => "unsupported_media",
            ImageError::OcrEngineError { .. } => "ocr_engine_error",
            ImageError::OcrNoValidOutput => "ocr_no_valid_output",
        }
    }
}

/// Job-level failures: short-circuit the job (fail-fast) or trigger a requeue
/// (transient), per spec.md §7.
#[derive(Error, Debug)]
pub enum JobError {
    #[error("request envelope failed schema validation: {detail}")]
    BadRequest { detail: String },

    #[error("validator callback did not arrive before TTL expiry")]
    ValidatorTimeout,

    #[error("infrastructure temporarily unavailable: {detail}")]
    AuthUnavailable { detail: String },

    #[error("job exhausted its retry budget")]
    ExhaustedRetries,

    #[error("unexpected internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl JobError {
    pub fn code(&self) -> &'static str {
        match self {
            JobError::BadRequest { .. } => "bad_request",
            JobError::ValidatorTimeout => "validator_timeout",
            JobError::AuthUnavailable { .. } => "auth_unavailable",
            JobError::ExhaustedRetries => "exhausted_retries",
            JobError::Internal(_) => "internal_error",
        }
    }

    /// Fail-fast errors are never retried; transient ones re-queue with `attempt += 1`.
    pub fn is_fail_fast(&self) -> bool {
        matches!(self, JobError::BadRequest { .. })
    }
}

pub type ImageResult<T> = std::result::Result<T, ImageError>;
pub type JobResult<T> = std::result::Result<T, JobError>;
