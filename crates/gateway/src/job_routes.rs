//! Enqueue API and operator job inspection.

use {
    axum::{
        Json, Router,
        extract::{Path, Query, State},
        http::StatusCode,
        response::IntoResponse,
        routing::get,
    },
    serde::Deserialize,
    tracing::warn,
};

use lernio_queue::{Error as QueueError, JobCategory, JobFilter, JobPayload, JobState};

use crate::server::AppState;

/// The external enqueue API. The request body is the tagged payload —
/// `{"category": "...", ...fields}` — and the response reports whether the
/// job was accepted or deduplicated against a live fingerprint.
async fn enqueue_handler(
    State(state): State<AppState>,
    Json(payload): Json<JobPayload>,
) -> impl IntoResponse {
    match state.queue.enqueue(payload).await {
        Ok(enqueued) => (StatusCode::OK, Json(serde_json::json!(enqueued))),
        Err(QueueError::InvalidPayload { message }) => (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": message })),
        ),
        Err(e) => {
            warn!(error = %e, "enqueue failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": "enqueue failed" })),
            )
        },
    }
}

#[derive(Debug, Deserialize)]
struct ListParams {
    category: Option<String>,
    state: Option<String>,
    limit: Option<u32>,
}

/// Recent jobs, filterable by category and state. Exhausted jobs stay
/// queryable here for operator diagnosis until the sweeper ages them out.
async fn list_handler(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> impl IntoResponse {
    let filter = JobFilter {
        category: params.category.as_deref().and_then(JobCategory::parse),
        state: params.state.as_deref().and_then(JobState::parse),
        limit: params.limit.unwrap_or(50),
    };
    match state.queue.list(filter).await {
        Ok(jobs) => (StatusCode::OK, Json(serde_json::json!(jobs))),
        Err(e) => {
            warn!(error = %e, "job listing failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": "listing failed" })),
            )
        },
    }
}

async fn get_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.queue.get(&id).await {
        Ok(Some(job)) => (StatusCode::OK, Json(serde_json::json!(job))),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": "job not found" })),
        ),
        Err(e) => {
            warn!(error = %e, "job lookup failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": "lookup failed" })),
            )
        },
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/jobs", get(list_handler).post(enqueue_handler))
        .route("/api/jobs/{id}", get(get_handler))
}
