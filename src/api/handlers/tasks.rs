use crate::AppState;
use crate::server::Task;
use crate::types::{AppError, Result};
use axum::{
    Json,
    extract::{Path, State},
};

pub async fn list_tasks(State(state): State<AppState>) -> Json<Vec<Task>> {
    Json(state.server.tasks())
}

/// One in-flight task. Finished tasks are gone, so they answer 404 too.
pub async fn get_task(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Task>> {
    state
        .server
        .task(&id)
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("task '{}'", id)))
}
