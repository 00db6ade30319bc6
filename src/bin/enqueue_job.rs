//! Operational tooling: pushes a hand-built OCR Request envelope onto the input
//! queue, grounded on the teacher's `enqueue_pending_ocr` debug binary.

use anyhow::Result;
use clap::Parser;
use uuid::Uuid;

use jarvis_ocr_service::kv::queue::Queue;
use jarvis_ocr_service::kv::Kv;
use jarvis_ocr_service::models::{
    ImageRef, ImageRefKind, JobEnvelope, OcrRequestPayload, Trace, JOB_TYPE_OCR_REQUEST,
    SCHEMA_VERSION,
};

#[derive(Parser)]
struct Args {
    #[arg(long)]
    redis_url: String,
    #[arg(long, default_value = "jarvis.ocr.jobs")]
    input_queue: String,
    #[arg(long)]
    reply_to: String,
    #[arg(long)]
    image_path: String,
    #[arg(long, default_value = "local_path")]
    kind: String,
    #[arg(long)]
    language: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let kind = match args.kind.as_str() {
        "local_path" => ImageRefKind::LocalPath,
        "s3" => ImageRefKind::S3,
        "minio" => ImageRefKind::Minio,
        "db" => ImageRefKind::Db,
        other => anyhow::bail!("unknown image ref kind {other}"),
    };

    let job = JobEnvelope {
        schema_version: SCHEMA_VERSION,
        job_id: Uuid::new_v4().to_string(),
        workflow_id: Uuid::new_v4().to_string(),
        job_type: JOB_TYPE_OCR_REQUEST.to_string(),
        source: Some("enqueue-job".to_string()),
        target: None,
        created_at: chrono::Utc::now(),
        attempt: 1,
        reply_to: args.reply_to,
        payload: OcrRequestPayload {
            image_count: 1,
            image_refs: vec![ImageRef {
                kind,
                value: args.image_path,
                index: 0,
            }],
            language: args.language,
        },
        trace: Trace::default(),
    };

    let kv = Kv::connect(&args.redis_url).await?;
    let queue = Queue::new(kv, args.input_queue);
    queue.push(&serde_json::to_string(&job)?).await?;

    println!("enqueued job {}", job.job_id);
    Ok(())
}
