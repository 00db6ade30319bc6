//! Resumer / Pipeline Driver (§4.6): the central per-job state machine.
//!
//! Suspension is externalized entirely into the Pending Validation State — this
//! struct and its methods hold no state across an `.await` boundary that
//! crosses a suspension point. A crash between tier attempts loses nothing but
//! the in-flight tier call itself; the next worker to see a callback (or the
//! sweep) picks the job back up from what was persisted (§9).

pub mod cascade;

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::{ImageError, JobError};
use crate::kv::queue::Queue;
use crate::kv::state_store::StateStore;
use crate::models::{
    CompletionPayload, ImageErrorDetail, JobEnvelope, JobStatus, PendingValidationState,
    PerImageResult, ResultMeta, TopLevelError, ValidatorVerdict,
};
use crate::reply::ReplyEmitter;
use crate::resolver::{ImageResolver, ResolveError};
use crate::tier_policy::ActiveTiers;
use crate::validator::ValidatorClient;

use cascade::{aggregate_confidence, truncate_for_emit};

pub enum ResumeOutcome {
    /// The callback advanced (or finished) a live job.
    Resumed,
    /// No Pending State existed for this correlation id — stale or already
    /// handled by another worker. Callers must answer the HTTP request 404,
    /// never 5xx (§4.5, Idempotent completion law).
    NotFound,
}

pub struct PipelineDriver {
    pub resolver: Arc<ImageResolver>,
    pub active_tiers: Arc<ActiveTiers>,
    pub validator: Arc<ValidatorClient>,
    pub state_store: Arc<StateStore>,
    pub reply_emitter: Arc<ReplyEmitter>,
    pub input_queue: Arc<Queue>,

    pub max_text_bytes: usize,
    pub max_attempts: u32,
    pub min_confidence: Option<f32>,
    pub language_default: String,
    pub pending_ttl_secs: u64,
    pub tier_timeout: Duration,
}

impl PipelineDriver {
    /// Entry point for a freshly popped job. Validates schema (fail-fast, §7)
    /// then drives image 0 from tier 0.
    pub async fn handle_new_job(&self, job: JobEnvelope) -> Result<(), JobError> {
        if let Err(detail) = job.validate() {
            if job.reply_to.trim().is_empty() {
                warn!(job_id = %job.job_id, %detail, "dropping job: bad_request with no reply_to to answer on");
                return Ok(());
            }
            let payload = CompletionPayload {
                status: JobStatus::Failed,
                results: Vec::new(),
                error: Some(TopLevelError {
                    code: "bad_request".to_string(),
                    message: detail,
                }),
            };
            self.emit(&job, payload).await;
            return Ok(());
        }

        self.run(job, 0, 0, Vec::new(), false).await
    }

    /// Invoked by the Callback Endpoint with a verdict for `correlation_id`.
    pub async fn resume(
        &self,
        correlation_id: &str,
        verdict: ValidatorVerdict,
    ) -> Result<ResumeOutcome, JobError> {
        let state = self
            .state_store
            .take(correlation_id)
            .await
            .map_err(|e| JobError::AuthUnavailable { detail: e.to_string() })?;

        let Some(state) = state else {
            return Ok(ResumeOutcome::NotFound);
        };

        let job = state.job.clone();
        let accept =
            verdict.is_valid && self.min_confidence.is_none_or(|min| verdict.confidence >= min);

        let mut results = state.results_so_far.clone();

        // The state was already atomically taken, so this job is now solely ours.
        // A job-level error past this point (e.g. the reply queue is down) must go
        // through the normal retry/exhaustion path rather than being lost; it must
        // not bubble up as an HTTP error, since the validator already delivered its
        // verdict and a 5xx here would cause a pointless retry on its side.
        let outcome = if accept {
            results.push(self.accepted_result(&state, &job, &verdict));
            let next_image = state.current_image_index + 1;
            self.run(job.clone(), next_image, 0, results, false).await
        } else {
            self.run(
                job.clone(),
                state.current_image_index,
                state.current_tier_index + 1,
                results,
                true,
            )
            .await
        };

        if let Err(e) = outcome {
            self.handle_job_error(job, e).await;
        }

        Ok(ResumeOutcome::Resumed)
    }

    /// Reconciles Pending states whose TTL has already elapsed (§5 "Cancellation
    /// & timeouts"): each is treated as `validator_timeout` and pushed through
    /// the normal job-level retry/exhaustion path. Returns the number handled.
    pub async fn sweep_expired(&self) -> usize {
        let now = chrono::Utc::now().timestamp();
        let candidates = match self.state_store.expired_candidates(now).await {
            Ok(ids) => ids,
            Err(e) => {
                warn!(error = %e, "sweep: failed to list expired candidates");
                return 0;
            }
        };

        let mut handled = 0;
        for correlation_id in candidates {
            match self.state_store.take(&correlation_id).await {
                Ok(Some(state)) => {
                    warn!(correlation_id, job_id = %state.job.job_id, "sweeping abandoned Pending Validation State");
                    self.handle_job_error(state.job, JobError::ValidatorTimeout).await;
                    handled += 1;
                }
                Ok(None) => {} // already resolved by a real callback between scan and take
                Err(e) => warn!(correlation_id, error = %e, "sweep: failed to take expired state"),
            }
        }
        handled
    }

    fn accepted_result(
        &self,
        state: &PendingValidationState,
        job: &JobEnvelope,
        verdict: &ValidatorVerdict,
    ) -> PerImageResult {
        let lang = job
            .payload
            .language
            .clone()
            .unwrap_or_else(|| self.language_default.clone());
        let confidence = aggregate_confidence(state.candidate_native_confidence, verdict.confidence);
        let reason: String = verdict.reason.chars().take(200).collect();
        PerImageResult {
            index: state.current_image_index,
            ocr_text: state.candidate_text.clone(),
            truncated: state.candidate_truncated,
            meta: ResultMeta {
                language: lang,
                confidence,
                text_len: state.candidate_text_len,
                is_valid: true,
                tier: state.winning_tier.clone(),
                validation_reason: Some(reason),
            },
            error: None,
        }
    }

    /// Walks images from `start_image` to completion. `start_tier` and
    /// `produced_any_for_start_image` only apply to `start_image` itself —
    /// every subsequent image begins at tier 0 with a clean slate.
    async fn run(
        &self,
        job: JobEnvelope,
        start_image: u32,
        start_tier: u32,
        mut results: Vec<PerImageResult>,
        produced_any_for_start_image: bool,
    ) -> Result<(), JobError> {
        let total = job.payload.image_refs.len() as u32;
        let mut image_index = start_image;
        let mut tier_index = start_tier;
        let mut produced_any = produced_any_for_start_image;

        while image_index < total {
            let image_ref = job
                .payload
                .image_refs
                .iter()
                .find(|r| r.index == image_index)
                .expect("validated envelope has one ref per index")
                .clone();

            loop {
                if tier_index as usize >= self.active_tiers.len() {
                    let last_tier = self
                        .active_tiers
                        .get(self.active_tiers.len().saturating_sub(1))
                        .map(|d| d.tier().as_str().to_string())
                        .unwrap_or_else(|| "none".to_string());
                    let (code, message) = if produced_any {
                        ("ocr_no_valid_output", "no tier produced validator-accepted output")
                    } else {
                        ("ocr_engine_error", "every tier failed to produce a candidate")
                    };
                    results.push(PerImageResult {
                        index: image_index,
                        ocr_text: String::new(),
                        truncated: false,
                        meta: ResultMeta {
                            language: job
                                .payload
                                .language
                                .clone()
                                .unwrap_or_else(|| self.language_default.clone()),
                            confidence: 0.0,
                            text_len: 0,
                            is_valid: false,
                            tier: last_tier,
                            validation_reason: None,
                        },
                        error: Some(ImageErrorDetail {
                            code: code.to_string(),
                            message: message.to_string(),
                        }),
                    });
                    break;
                }

                let driver = self
                    .active_tiers
                    .get(tier_index as usize)
                    .expect("tier_index checked above")
                    .clone();

                let lang = job
                    .payload
                    .language
                    .clone()
                    .unwrap_or_else(|| self.language_default.clone());

                match self.resolver.resolve(&image_ref).await {
                    Err(ResolveError::Image(img_err)) => {
                        results.push(Self::image_error_result(image_index, &img_err));
                        break;
                    }
                    Err(ResolveError::Transient(e)) => {
                        return Err(JobError::AuthUnavailable { detail: e.to_string() });
                    }
                    Ok((bytes, _media)) => {
                        let extracted =
                            tokio::time::timeout(self.tier_timeout, driver.extract(&bytes, &lang))
                                .await;

                        let candidate = match extracted {
                            Ok(Ok(candidate)) => candidate,
                            Ok(Err(e)) => {
                                warn!(tier = driver.tier().as_str(), error = %e, "tier failed, advancing cascade");
                                tier_index += 1;
                                continue;
                            }
                            Err(_elapsed) => {
                                warn!(tier = driver.tier().as_str(), "tier exceeded wall-clock budget, advancing cascade");
                                tier_index += 1;
                                continue;
                            }
                        };

                        produced_any = true;
                        let (truncated_text, truncated_flag, text_len) =
                            truncate_for_emit(&candidate.text, self.max_text_bytes);

                        let correlation_id = Uuid::new_v4().to_string();
                        let state = PendingValidationState {
                            job: job.clone(),
                            current_image_index: image_index,
                            current_tier_index: tier_index,
                            candidate_text: truncated_text,
                            candidate_truncated: truncated_flag,
                            candidate_text_len: text_len,
                            candidate_native_confidence: candidate.native_confidence,
                            winning_tier: driver.tier().as_str().to_string(),
                            results_so_far: results.clone(),
                            attempt: job.attempt,
                            created_at: chrono::Utc::now(),
                        };

                        self.state_store
                            .save(&correlation_id, &state, self.pending_ttl_secs)
                            .await
                            .map_err(|e| JobError::AuthUnavailable { detail: e.to_string() })?;

                        if let Err(e) = self
                            .validator
                            .enqueue(&correlation_id, &state.candidate_text)
                            .await
                        {
                            let _ = self.state_store.delete(&correlation_id).await;
                            return Err(JobError::AuthUnavailable { detail: e.to_string() });
                        }

                        // Suspended: this worker's involvement with this job ends here.
                        return Ok(());
                    }
                }
            }

            image_index += 1;
            tier_index = 0;
            produced_any = false;
        }

        self.finish(job, results).await
    }

    fn image_error_result(index: u32, err: &ImageError) -> PerImageResult {
        PerImageResult {
            index,
            ocr_text: String::new(),
            truncated: false,
            meta: ResultMeta {
                language: String::new(),
                confidence: 0.0,
                text_len: 0,
                is_valid: false,
                tier: String::new(),
                validation_reason: None,
            },
            error: Some(ImageErrorDetail {
                code: err.code().to_string(),
                message: err.to_string(),
            }),
        }
    }

    async fn finish(&self, job: JobEnvelope, mut results: Vec<PerImageResult>) -> Result<(), JobError> {
        results.sort_by_key(|r| r.index);
        let status = if results.iter().any(|r| r.meta.is_valid) {
            JobStatus::Success
        } else {
            JobStatus::Failed
        };
        let error = if status == JobStatus::Failed {
            Some(TopLevelError {
                code: "ocr_all_images_failed".to_string(),
                message: "no image in this job produced validator-accepted text".to_string(),
            })
        } else {
            None
        };

        info!(job_id = %job.job_id, status = ?status, images = results.len(), "job complete");
        self.emit(&job, CompletionPayload { status, results, error }).await;
        Ok(())
    }

    async fn emit(&self, job: &JobEnvelope, payload: CompletionPayload) {
        let envelope = crate::models::CompletionEnvelope::from_job(job, payload);
        if let Err(e) = self.reply_emitter.emit(job, envelope).await {
            warn!(job_id = %job.job_id, error = %e, "failed to emit completion envelope");
        }
    }

    /// Job-level transient error handling (§4.6 retry policy): re-queue with
    /// `attempt += 1` up to `max_attempts`, otherwise emit a `failed` completion
    /// with `exhausted_retries`.
    pub async fn handle_job_error(&self, mut job: JobEnvelope, err: JobError) {
        if err.is_fail_fast() {
            warn!(job_id = %job.job_id, error = %err, "fail-fast job error");
            let payload = CompletionPayload {
                status: JobStatus::Failed,
                results: Vec::new(),
                error: Some(TopLevelError {
                    code: err.code().to_string(),
                    message: err.to_string(),
                }),
            };
            self.emit(&job, payload).await;
            return;
        }

        if job.attempt >= self.max_attempts {
            warn!(job_id = %job.job_id, attempt = job.attempt, "exhausted retries");
            let payload = CompletionPayload {
                status: JobStatus::Failed,
                results: Vec::new(),
                error: Some(TopLevelError {
                    code: "exhausted_retries".to_string(),
                    message: format!("job-level error after {} attempts: {}", job.attempt, err),
                }),
            };
            self.emit(&job, payload).await;
            return;
        }

        job.attempt += 1;
        match serde_json::to_string(&job) {
            Ok(payload) => {
                if let Err(e) = self.input_queue.push(&payload).await {
                    warn!(job_id = %job.job_id, error = %e, "failed to requeue job, it will be lost");
                }
            }
            Err(e) => warn!(job_id = %job.job_id, error = %e, "failed to serialize job for requeue"),
        }
    }
}
