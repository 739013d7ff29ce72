//! Operation log, active task and status handlers

use axum::{Json, extract::State, http::StatusCode};
use nimbus_core::domain::log::LogEntry;
use nimbus_core::domain::task::ActiveTask;
use nimbus_core::dto::status::StatusSummary;

use crate::api::AppState;

/// GET /log
pub async fn get_log(State(plane): State<AppState>) -> Json<Vec<LogEntry>> {
    Json(plane.operation_log())
}

/// DELETE /log
pub async fn clear_log(State(plane): State<AppState>) -> StatusCode {
    plane.clear_operation_log();
    StatusCode::NO_CONTENT
}

/// GET /tasks
pub async fn list_tasks(State(plane): State<AppState>) -> Json<Vec<ActiveTask>> {
    Json(plane.list_active_tasks())
}

/// GET /status
/// Compact summary polled to detect changes
pub async fn status(State(plane): State<AppState>) -> Json<StatusSummary> {
    Json(plane.status())
}
