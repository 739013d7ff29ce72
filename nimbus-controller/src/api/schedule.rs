//! Schedule API Handlers

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use nimbus_core::domain::schedule::Schedule;
use nimbus_core::dto::schedule::{ScheduleView, SetSchedule, TriggerInfo};
use nimbus_core::dto::task::TaskAccepted;

use crate::api::AppState;
use crate::api::error::ApiResult;

/// PUT /instances/{id}/schedule
/// Sets or replaces the daily schedule
pub async fn set_schedule(
    State(plane): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<SetSchedule>,
) -> ApiResult<Json<Schedule>> {
    let schedule = plane
        .set_schedule(&id, &req.start_time, req.duration_minutes)
        .await?;
    Ok(Json(schedule))
}

/// DELETE /instances/{id}/schedule
pub async fn remove_schedule(
    State(plane): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    plane.remove_schedule(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /instances/{id}/schedule/run
/// Fires the start trigger now
pub async fn run_schedule_now(
    State(plane): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<(StatusCode, Json<TaskAccepted>)> {
    let task_id = plane.run_schedule_now(&id)?;
    Ok((StatusCode::ACCEPTED, Json(TaskAccepted { task_id })))
}

/// GET /schedules
pub async fn list_schedules(State(plane): State<AppState>) -> Json<Vec<ScheduleView>> {
    Json(plane.list_schedules())
}

/// GET /schedules/triggers
pub async fn list_triggers(State(plane): State<AppState>) -> Json<Vec<TriggerInfo>> {
    Json(plane.list_triggers())
}
