//! Instance API Handlers
//!
//! HTTP endpoints for tracked instances and their lifecycle.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use nimbus_core::domain::instance::Instance;
use nimbus_core::dto::instance::{AppLog, CreateInstance, RegisterInstance, RenameInstance};
use nimbus_core::dto::task::TaskAccepted;
use serde::Deserialize;

use crate::api::AppState;
use crate::api::error::ApiResult;

/// Log lines returned when the request does not say
const DEFAULT_LOG_LINES: usize = 100;

#[derive(Debug, Deserialize)]
pub struct AppLogQuery {
    pub lines: Option<usize>,
}

// =============================================================================
// Query Endpoints
// =============================================================================

/// GET /instances
pub async fn list_instances(State(plane): State<AppState>) -> Json<Vec<Instance>> {
    tracing::debug!("Listing instances");
    Json(plane.list_instances())
}

/// GET /instances/{id}
pub async fn get_instance(
    State(plane): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Instance>> {
    Ok(Json(plane.get_instance(&id)?))
}

/// GET /instances/{id}/app-log?lines=N
/// Application process status and log tail, read over SSH
pub async fn app_log(
    State(plane): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<AppLogQuery>,
) -> ApiResult<Json<AppLog>> {
    let lines = query.lines.unwrap_or(DEFAULT_LOG_LINES);
    Ok(Json(plane.fetch_app_log(&id, lines).await?))
}

// =============================================================================
// Lifecycle Endpoints
// =============================================================================

/// POST /instances
/// Allocates a new instance; completes asynchronously
pub async fn create_instance(
    State(plane): State<AppState>,
    Json(req): Json<CreateInstance>,
) -> ApiResult<(StatusCode, Json<TaskAccepted>)> {
    tracing::info!("Creating instance");
    let task_id = plane.create_instance(req.display_name)?;
    Ok((StatusCode::ACCEPTED, Json(TaskAccepted { task_id })))
}

/// POST /instances/register
pub async fn register_instance(
    State(plane): State<AppState>,
    Json(req): Json<RegisterInstance>,
) -> ApiResult<(StatusCode, Json<Instance>)> {
    tracing::info!("Registering existing instance {}", req.id);
    let instance = plane.register_existing(&req.id, req.display_name).await?;
    Ok((StatusCode::CREATED, Json(instance)))
}

/// POST /instances/{id}/start
pub async fn start_instance(
    State(plane): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<(StatusCode, Json<TaskAccepted>)> {
    let task_id = plane.start_instance(&id)?;
    Ok((StatusCode::ACCEPTED, Json(TaskAccepted { task_id })))
}

/// POST /instances/{id}/stop
pub async fn stop_instance(
    State(plane): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<(StatusCode, Json<TaskAccepted>)> {
    let task_id = plane.stop_instance(&id)?;
    Ok((StatusCode::ACCEPTED, Json(TaskAccepted { task_id })))
}

/// PUT /instances/{id}/name
pub async fn rename_instance(
    State(plane): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<RenameInstance>,
) -> ApiResult<Json<Instance>> {
    Ok(Json(plane.rename_instance(&id, &req.display_name).await?))
}

/// DELETE /instances/{id}
/// Stops tracking; the remote instance is not touched
pub async fn remove_instance(
    State(plane): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Instance>> {
    tracing::info!("Removing instance {}", id);
    Ok(Json(plane.remove_instance(&id).await?))
}
