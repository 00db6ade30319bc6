//! Callback Endpoint (§4.5): a thin HTTP adapter onto the Resumer. Performs no
//! OCR work itself.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tracing::error;

use crate::models::CallbackBody;
use crate::pipeline::{PipelineDriver, ResumeOutcome};

#[derive(Clone)]
pub struct CallbackState {
    pub pipeline: Arc<PipelineDriver>,
}

#[derive(Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

pub fn router(state: CallbackState) -> Router {
    Router::new()
        .route("/internal/validation/callback", post(handle_callback))
        .route("/healthz", get(health))
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    StatusCode::OK
}

async fn handle_callback(
    State(state): State<CallbackState>,
    body: axum::extract::Result<Json<CallbackBody>>,
) -> impl IntoResponse {
    let Json(body) = match body {
        Ok(b) => b,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorBody {
                    code: "bad_callback",
                    message: e.to_string(),
                }),
            )
                .into_response();
        }
    };

    if !(0.0..=1.0).contains(&body.verdict.confidence) || body.verdict.reason.chars().count() > 200
    {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorBody {
                code: "bad_callback",
                message: "confidence out of [0,1] or reason exceeds 200 chars".to_string(),
            }),
        )
            .into_response();
    }

    match state
        .pipeline
        .resume(&body.correlation_id, body.verdict)
        .await
    {
        Ok(ResumeOutcome::Resumed) => StatusCode::OK.into_response(),
        Ok(ResumeOutcome::NotFound) => StatusCode::NOT_FOUND.into_response(),
        Err(e) => {
            // State could not even be read back (store unreachable); nothing was
            // consumed, so it's safe to ask the validator to retry the callback.
            error!(correlation_id = %body.correlation_id, error = %e, "state store unreachable while resuming");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
