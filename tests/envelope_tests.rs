//! Schema validation and round-trip properties that don't require a live
//! Redis instance (§8 "Boundary behaviors", "Round-trip of request fields").

use jarvis_ocr_service::models::{
    CompletionEnvelope, CompletionPayload, ImageRef, ImageRefKind, JobEnvelope, JobStatus,
    OcrRequestPayload, Trace, JOB_TYPE_OCR_REQUEST, SCHEMA_VERSION,
};

fn base_job(image_count: u32) -> JobEnvelope {
    let image_refs = (0..image_count)
        .map(|i| ImageRef {
            kind: ImageRefKind::LocalPath,
            value: format!("photo-{i}.png"),
            index: i,
        })
        .collect();

    JobEnvelope {
        schema_version: SCHEMA_VERSION,
        job_id: "job-1".to_string(),
        workflow_id: "wf-1".to_string(),
        job_type: JOB_TYPE_OCR_REQUEST.to_string(),
        source: None,
        target: None,
        created_at: chrono::Utc::now(),
        attempt: 1,
        reply_to: "recipe.replies".to_string(),
        payload: OcrRequestPayload {
            image_count,
            image_refs,
            language: None,
        },
        trace: Trace {
            request_id: Some("req-1".to_string()),
            parent_job_id: None,
        },
    }
}

#[test]
fn accepts_one_image() {
    assert!(base_job(1).validate().is_ok());
}

#[test]
fn accepts_eight_images() {
    assert!(base_job(8).validate().is_ok());
}

#[test]
fn rejects_zero_images() {
    assert!(base_job(0).validate().is_err());
}

#[test]
fn rejects_nine_images() {
    assert!(base_job(9).validate().is_err());
}

#[test]
fn rejects_missing_reply_to() {
    let mut job = base_job(1);
    job.reply_to = String::new();
    assert!(job.validate().is_err());
}

#[test]
fn rejects_image_count_mismatch() {
    let mut job = base_job(1);
    job.payload.image_count = 2;
    assert!(job.validate().is_err());
}

#[test]
fn rejects_duplicate_index() {
    let mut job = base_job(2);
    job.payload.image_refs[1].index = 0;
    assert!(job.validate().is_err());
}

#[test]
fn completion_round_trips_request_fields() {
    let job = base_job(1);
    let completion = CompletionEnvelope::from_job(
        &job,
        CompletionPayload {
            status: JobStatus::Success,
            results: Vec::new(),
            error: None,
        },
    );

    assert_eq!(completion.job_id, job.job_id);
    assert_eq!(completion.workflow_id, job.workflow_id);
    assert_eq!(completion.trace.request_id, job.trace.request_id);
    assert_eq!(completion.trace.parent_job_id, Some(job.job_id.clone()));
    assert_eq!(completion.source, "jarvis-ocr-service");
}

#[test]
fn completion_status_failed_carries_no_error_by_default() {
    let job = base_job(1);
    let completion = CompletionEnvelope::from_job(
        &job,
        CompletionPayload {
            status: JobStatus::Failed,
            results: Vec::new(),
            error: None,
        },
    );
    assert_eq!(completion.payload.status, JobStatus::Failed);
}
