//! Admin HTTP API.
//!
//! JSON bodies use the core entities' wire shape: submitted tasks come back
//! as `Task`, the registry as `WorkerInfo` objects.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use tracing::warn;

use agentrun_core::{Heartbeat, TaskId};

use crate::coordinator::{Coordinator, CoordinatorError, SubmitOptions};
use crate::metrics::collect_metrics;
use crate::queue::QueueError;

/// Request body for task submission.
#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    pub goal: String,
    #[serde(default)]
    pub priority: Option<i32>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub max_retry: Option<u32>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
pub struct PeekQuery {
    #[serde(default = "default_peek_limit")]
    pub limit: usize,
}

fn default_peek_limit() -> usize {
    100
}

/// Error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(status: StatusCode, error: impl ToString) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
        }),
    )
        .into_response()
}

fn coordinator_error(e: CoordinatorError) -> Response {
    let status = match &e {
        CoordinatorError::Closed => StatusCode::SERVICE_UNAVAILABLE,
        CoordinatorError::WorkerNotFound(_) => StatusCode::NOT_FOUND,
        CoordinatorError::WorkerBusy { .. } => StatusCode::CONFLICT,
        CoordinatorError::Queue(QueueError::Full { .. }) => StatusCode::TOO_MANY_REQUESTS,
        CoordinatorError::Queue(QueueError::TaskNotFound(_)) => StatusCode::NOT_FOUND,
        CoordinatorError::Queue(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        warn!(error = %e, "Admin request failed");
    }
    error_response(status, e)
}

/// Create the admin HTTP router.
pub fn create_router(coordinator: Arc<Coordinator>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
        .route("/v1/workers", get(list_workers))
        .route("/v1/workers/heartbeat", post(heartbeat))
        .route("/v1/tasks", get(peek_tasks).post(submit_task))
        .route("/v1/tasks/:id/result", get(task_result))
        .route("/v1/dead-letters", get(dead_letters))
        .layer(TraceLayer::new_for_http())
        .with_state(coordinator)
}

async fn health_check(State(coordinator): State<Arc<Coordinator>>) -> impl IntoResponse {
    let status = if coordinator.is_closed() { "closed" } else { "ok" };
    Json(serde_json::json!({ "status": status }))
}

async fn metrics(State(coordinator): State<Arc<Coordinator>>) -> impl IntoResponse {
    let body = collect_metrics(&coordinator).await;
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    )
}

async fn list_workers(State(coordinator): State<Arc<Coordinator>>) -> impl IntoResponse {
    Json(coordinator.list_workers().await)
}

async fn heartbeat(
    State(coordinator): State<Arc<Coordinator>>,
    Json(beat): Json<Heartbeat>,
) -> impl IntoResponse {
    coordinator.heartbeat(beat).await;
    StatusCode::NO_CONTENT
}

async fn submit_task(
    State(coordinator): State<Arc<Coordinator>>,
    Json(req): Json<SubmitRequest>,
) -> Response {
    if req.goal.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "goal is required");
    }

    let mut options = SubmitOptions::new();
    if let Some(priority) = req.priority {
        options = options.with_priority(priority);
    }
    if let Some(ms) = req.timeout_ms {
        options = options.with_timeout(Duration::from_millis(ms));
    }
    if let Some(max_retry) = req.max_retry {
        options = options.with_max_retry(max_retry);
    }
    for (k, v) in req.metadata {
        options = options.with_metadata(k, v);
    }

    match coordinator.submit(req.goal, options).await {
        Ok(task) => (StatusCode::CREATED, Json(task)).into_response(),
        Err(e) => coordinator_error(e),
    }
}

async fn peek_tasks(
    State(coordinator): State<Arc<Coordinator>>,
    Query(query): Query<PeekQuery>,
) -> Response {
    match coordinator.queue().peek(query.limit).await {
        Ok(tasks) => Json(tasks).into_response(),
        Err(e) => coordinator_error(e.into()),
    }
}

async fn task_result(
    State(coordinator): State<Arc<Coordinator>>,
    Path(id): Path<String>,
) -> Response {
    match coordinator.task_result(&TaskId::new(id.clone())).await {
        Some(result) => Json(result).into_response(),
        None => error_response(StatusCode::NOT_FOUND, format!("No result for task {id}")),
    }
}

async fn dead_letters(State(coordinator): State<Arc<Coordinator>>) -> Response {
    match coordinator.queue().dead_letters().await {
        Ok(letters) => Json(letters).into_response(),
        Err(e) => coordinator_error(e.into()),
    }
}
