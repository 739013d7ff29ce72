//! API Module
//!
//! HTTP API layer for the controller.
//! Each submodule handles endpoints for a specific resource.

pub mod error;
pub mod health;
pub mod instance;
pub mod log;
pub mod schedule;

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post, put},
};
use tower_http::trace::TraceLayer;

use crate::service::ControlPlane;

/// Shared handler state
pub type AppState = Arc<ControlPlane>;

/// Create the main API router with all endpoints
pub fn create_router(plane: AppState) -> Router {
    Router::new()
        // Health and summary
        .route("/health", get(health::health_check))
        .route("/status", get(log::status))
        // Instance endpoints
        .route(
            "/instances",
            get(instance::list_instances).post(instance::create_instance),
        )
        .route("/instances/register", post(instance::register_instance))
        .route(
            "/instances/{id}",
            get(instance::get_instance).delete(instance::remove_instance),
        )
        .route("/instances/{id}/start", post(instance::start_instance))
        .route("/instances/{id}/stop", post(instance::stop_instance))
        .route("/instances/{id}/name", put(instance::rename_instance))
        .route("/instances/{id}/app-log", get(instance::app_log))
        // Schedule endpoints
        .route(
            "/instances/{id}/schedule",
            put(schedule::set_schedule).delete(schedule::remove_schedule),
        )
        .route("/instances/{id}/schedule/run", post(schedule::run_schedule_now))
        .route("/schedules", get(schedule::list_schedules))
        .route("/schedules/triggers", get(schedule::list_triggers))
        // Tasks and operation log
        .route("/tasks", get(log::list_tasks))
        .route("/log", get(log::get_log).delete(log::clear_log))
        // Add state and middleware
        .with_state(plane)
        .layer(TraceLayer::new_for_http())
}
