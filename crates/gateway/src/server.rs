//! Router assembly and HTTP server.

use std::sync::Arc;

use {
    axum::{Json, Router, routing::get},
    tracing::info,
};

use {
    lernio_queue::JobQueue,
    lernio_reconcile::EventSubmitter,
    lernio_scheduler::ScheduleService,
    lernio_wacloud::WaCloudConfig,
};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub queue: Arc<JobQueue>,
    pub scheduler: Arc<ScheduleService>,
    pub submitter: EventSubmitter,
    pub wa_config: Arc<WaCloudConfig>,
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Assemble the full router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .merge(crate::webhook_routes::router())
        .merge(crate::job_routes::router())
        .merge(crate::schedule_routes::router())
        .with_state(state)
}

/// Bind and serve until the process is stopped.
pub async fn run(state: AppState, bind: &str, port: u16) -> anyhow::Result<()> {
    let router = build_router(state);
    let addr = format!("{bind}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "gateway listening");
    axum::serve(listener, router).await?;
    Ok(())
}
