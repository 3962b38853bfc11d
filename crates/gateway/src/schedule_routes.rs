//! Operator API for course schedules.

use {
    axum::{
        Json, Router,
        extract::{Path, State},
        http::StatusCode,
        response::IntoResponse,
        routing::{delete, get, post},
    },
    tracing::warn,
};

use lernio_scheduler::{Error as SchedulerError, ScheduleCreate};

use crate::server::AppState;

fn error_response(e: &SchedulerError) -> (StatusCode, Json<serde_json::Value>) {
    let status = match e {
        SchedulerError::ScheduleNotFound { .. } => StatusCode::NOT_FOUND,
        SchedulerError::CronParse(_) | SchedulerError::UnknownTimezone { .. } => {
            StatusCode::BAD_REQUEST
        },
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(serde_json::json!({ "error": e.to_string() })))
}

async fn create_handler(
    State(state): State<AppState>,
    Json(create): Json<ScheduleCreate>,
) -> impl IntoResponse {
    match state.scheduler.add(create).await {
        Ok(schedule) => (StatusCode::OK, Json(serde_json::json!(schedule))),
        Err(e) => {
            warn!(error = %e, "schedule creation failed");
            error_response(&e)
        },
    }
}

async fn list_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!(state.scheduler.list().await))
}

async fn status_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!(state.scheduler.status().await))
}

async fn start_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    transition(state.scheduler.start_schedule(&id).await)
}

async fn suspend_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    transition(state.scheduler.suspend(&id).await)
}

async fn resume_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    transition(state.scheduler.resume(&id).await)
}

async fn tick_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    transition(state.scheduler.tick(&id).await)
}

async fn delete_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    transition(state.scheduler.remove(&id).await)
}

fn transition(result: Result<(), SchedulerError>) -> (StatusCode, Json<serde_json::Value>) {
    match result {
        Ok(()) => (StatusCode::OK, Json(serde_json::json!({ "ok": true }))),
        Err(e) => error_response(&e),
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/schedules", get(list_handler).post(create_handler))
        .route("/api/schedules/status", get(status_handler))
        .route("/api/schedules/{id}", delete(delete_handler))
        .route("/api/schedules/{id}/start", post(start_handler))
        .route("/api/schedules/{id}/suspend", post(suspend_handler))
        .route("/api/schedules/{id}/resume", post(resume_handler))
        .route("/api/schedules/{id}/tick", post(tick_handler))
}
