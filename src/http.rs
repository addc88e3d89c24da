use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde_json::json;
use tracing::debug;

use crate::errors::RunnerError;
use crate::queue::InMemoryQueue;
use crate::types::JobRequest;
use crate::worker::WorkerStatus;

/// Shared state for the submission/health endpoints.
#[derive(Clone)]
pub struct AppState {
    pub queue: Arc<InMemoryQueue>,
    pub status: Arc<WorkerStatus>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/jobs", post(submit_job))
        .route("/jobs/{id}", get(job_record))
        .route("/health", get(health))
        .with_state(state)
}

/// Accept a job payload, validate it, and hand back the assigned id. The
/// result is fetched later by id.
async fn submit_job(
    State(state): State<AppState>,
    Json(payload): Json<serde_json::Value>,
) -> Response {
    let request = match JobRequest::from_value(payload) {
        Ok(request) => request,
        Err(e) => {
            debug!(error = %e, "rejected malformed job payload");
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "errors": [e.to_string()] })),
            )
                .into_response();
        }
    };

    match state.queue.enqueue(request) {
        Ok(job_id) => (StatusCode::ACCEPTED, Json(json!({ "jobId": job_id }))).into_response(),
        Err(RunnerError::Validation(message)) => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "errors": [message] })),
        )
            .into_response(),
        Err(RunnerError::Queue(message)) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "error": message })),
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": e.to_string() })),
        )
            .into_response(),
    }
}

async fn job_record(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.queue.record(&id) {
        Some(record) => (StatusCode::OK, Json(record)).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "job not found" })),
        )
            .into_response(),
    }
}

async fn health(State(state): State<AppState>) -> Response {
    let status = state.status.snapshot();
    let healthy = status.accepting;
    let body = json!({
        "status": if healthy { "healthy" } else { "unhealthy" },
        "timestamp": Utc::now(),
        "queue": {
            "name": state.queue.name(),
            "queued": state.queue.queued_len(),
        },
        "worker": status,
    });
    let code = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(body)).into_response()
}
