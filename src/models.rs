//! Wire and persisted data shapes shared by every module: the Job Envelope, its
//! Completion mirror, and the Pending Validation State written to the KV store.

use serde::{Deserialize, Serialize};

pub const SCHEMA_VERSION: u32 = 1;
pub const JOB_TYPE_OCR_REQUEST: &str = "ocr.requested";
pub const JOB_TYPE_OCR_COMPLETED: &str = "ocr.completed";
pub const SOURCE: &str = "jarvis-ocr-service";

/// The closed set of configured OCR tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Tesseract,
    Easyocr,
    Paddleocr,
    AppleVision,
    LlmLocal,
    LlmCloud,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Tesseract => "tesseract",
            Tier::Easyocr => "easyocr",
            Tier::Paddleocr => "paddleocr",
            Tier::AppleVision => "apple_vision",
            Tier::LlmLocal => "llm_local",
            Tier::LlmCloud => "llm_cloud",
        }
    }

    pub fn parse(s: &str) -> Option<Tier> {
        match s.trim() {
            "tesseract" => Some(Tier::Tesseract),
            "easyocr" => Some(Tier::Easyocr),
            "paddleocr" => Some(Tier::Paddleocr),
            "apple_vision" => Some(Tier::AppleVision),
            "llm_local" => Some(Tier::LlmLocal),
            "llm_cloud" => Some(Tier::LlmCloud),
            _ => None,
        }
    }

    /// True for tiers gated to a specific host OS.
    pub fn is_platform_gated(&self) -> bool {
        matches!(self, Tier::AppleVision)
    }

    pub fn platform_available(&self) -> bool {
        match self {
            Tier::AppleVision => cfg!(target_os = "macos"),
            _ => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageRefKind {
    LocalPath,
    S3,
    Minio,
    Db,
}

/// Origin and opaque locator for one requested image. Borrowed by the resolver,
/// never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageRef {
    pub kind: ImageRefKind,
    pub value: String,
    pub index: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Trace {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_job_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrRequestPayload {
    pub image_count: u32,
    pub image_refs: Vec<ImageRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

/// Incoming job envelope, as popped from the input queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobEnvelope {
    pub schema_version: u32,
    pub job_id: String,
    pub workflow_id: String,
    pub job_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub attempt: u32,
    pub reply_to: String,
    pub payload: OcrRequestPayload,
    #[serde(default)]
    pub trace: Trace,
}

impl JobEnvelope {
    /// Structural checks per the envelope invariants; does not touch the network.
    pub fn validate(&self) -> Result<(), String> {
        if self.schema_version != SCHEMA_VERSION {
            return Err(format!("unsupported schema_version {}", self.schema_version));
        }
        if self.job_type != JOB_TYPE_OCR_REQUEST {
            return Err(format!("unexpected job_type {}", self.job_type));
        }
        if self.reply_to.trim().is_empty() {
            return Err("missing reply_to".to_string());
        }
        if self.attempt < 1 {
            return Err("attempt must be >= 1".to_string());
        }
        let count = self.payload.image_refs.len() as u32;
        if count != self.payload.image_count {
            return Err("image_count does not match image_refs length".to_string());
        }
        if !(1..=8).contains(&count) {
            return Err(format!("image_count {} out of bounds [1,8]", count));
        }
        let mut seen = std::collections::HashSet::new();
        for r in &self.payload.image_refs {
            if r.index >= count {
                return Err(format!("image index {} out of range", r.index));
            }
            if !seen.insert(r.index) {
                return Err(format!("duplicate image index {}", r.index));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageErrorDetail {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultMeta {
    pub language: String,
    pub confidence: f32,
    pub text_len: usize,
    pub is_valid: bool,
    pub tier: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerImageResult {
    pub index: u32,
    pub ocr_text: String,
    pub truncated: bool,
    pub meta: ResultMeta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ImageErrorDetail>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopLevelError {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Success,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionPayload {
    pub status: JobStatus,
    pub results: Vec<PerImageResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<TopLevelError>,
}

/// Outgoing completion envelope, pushed to `reply_to`. Mirrors `JobEnvelope`'s shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionEnvelope {
    pub schema_version: u32,
    pub job_id: String,
    pub workflow_id: String,
    pub job_type: String,
    pub source: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub payload: CompletionPayload,
    pub trace: Trace,
}

impl CompletionEnvelope {
    pub fn from_job(job: &JobEnvelope, payload: CompletionPayload) -> Self {
        CompletionEnvelope {
            schema_version: SCHEMA_VERSION,
            job_id: job.job_id.clone(),
            workflow_id: job.workflow_id.clone(),
            job_type: JOB_TYPE_OCR_COMPLETED.to_string(),
            source: SOURCE.to_string(),
            created_at: chrono::Utc::now(),
            payload,
            trace: Trace {
                request_id: job.trace.request_id.clone(),
                parent_job_id: Some(job.job_id.clone()),
            },
        }
    }
}

/// The suspended per-job cursor, persisted under `ocr:pending:{correlation_id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingValidationState {
    pub job: JobEnvelope,
    pub current_image_index: u32,
    pub current_tier_index: u32,
    pub candidate_text: String,
    pub candidate_truncated: bool,
    pub candidate_text_len: usize,
    pub candidate_native_confidence: Option<f32>,
    pub winning_tier: String,
    pub results_so_far: Vec<PerImageResult>,
    pub attempt: u32,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Body the validator is contracted to POST back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatorVerdict {
    pub is_valid: bool,
    pub confidence: f32,
    pub reason: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackBody {
    pub correlation_id: String,
    #[serde(flatten)]
    pub verdict: ValidatorVerdict,
}

/// Outbound request enqueued to the validator's job queue.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationRequest {
    pub candidate_text: String,
    pub callback_url: String,
    pub correlation_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_hint: Option<String>,
}
