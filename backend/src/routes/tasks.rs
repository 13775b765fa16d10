use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use chrono::Utc;
use serde_json::json;
use shared::automation::reconcile;
use shared::{CreateTaskRequest, Task, TaskId, TaskStatus, UpdateTaskRequest, User, UserId};

use super::{require_text, AppState, LoadedProject};
use crate::auth::{authorize, Capability, CurrentUser};
use crate::error::{AppError, AppResult};

fn reject_manual_overdue(status: Option<TaskStatus>) -> AppResult<()> {
    if status == Some(TaskStatus::Overdue) {
        return Err(AppError::BadRequest(
            "status 'overdue' is assigned automatically".to_string(),
        ));
    }
    Ok(())
}

async fn check_assignee(state: &AppState, assignee_id: Option<UserId>) -> AppResult<()> {
    if let Some(id) = assignee_id {
        if state.store.get_user(id).await?.is_none() {
            return Err(AppError::BadRequest(format!("assignee {id} does not exist")));
        }
    }
    Ok(())
}

/// Loads a task the caller may see through its project.
async fn load_visible_task(state: &AppState, user: &User, id: TaskId) -> AppResult<Task> {
    let task = state
        .store
        .get_task(id)
        .await?
        .ok_or(AppError::NotFound("Task"))?;
    let loaded = LoadedProject::load(state, user, task.project_id).await?;
    authorize(user, Capability::ViewProject(loaded.access()))?;
    Ok(task)
}

pub(super) async fn my_tasks(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> AppResult<Json<Vec<Task>>> {
    Ok(Json(state.store.list_user_tasks(user.id).await?))
}

pub(super) async fn create_task(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(mut payload): Json<CreateTaskRequest>,
) -> AppResult<(StatusCode, Json<Task>)> {
    require_text("title", &payload.title)?;
    reject_manual_overdue(Some(payload.status))?;

    let loaded = LoadedProject::load(&state, &user, payload.project_id).await?;
    authorize(&user, Capability::ViewProject(loaded.access()))?;
    check_assignee(&state, payload.assignee_id).await?;

    let now = Utc::now();
    payload.status = reconcile(&Task::new(0, payload.clone(), now), now);

    let task = state.store.create_task(payload).await?;
    Ok((StatusCode::CREATED, Json(task)))
}

pub(super) async fn get_task(
    Path(id): Path<TaskId>,
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> AppResult<Json<Task>> {
    Ok(Json(load_visible_task(&state, &user, id).await?))
}

pub(super) async fn update_task(
    Path(id): Path<TaskId>,
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(payload): Json<UpdateTaskRequest>,
) -> AppResult<Json<Task>> {
    reject_manual_overdue(payload.status)?;
    if let Some(title) = &payload.title {
        require_text("title", title)?;
    }

    let current = load_visible_task(&state, &user, id).await?;
    if let Some(project_id) = payload.project_id.filter(|p| *p != current.project_id) {
        let target = LoadedProject::load(&state, &user, project_id).await?;
        authorize(&user, Capability::ViewProject(target.access()))?;
    }
    if let Some(assignee_id) = payload.assignee_id {
        check_assignee(&state, assignee_id).await?;
    }

    state
        .store
        .update_task(id, payload, Utc::now())
        .await?
        .map(Json)
        .ok_or(AppError::NotFound("Task"))
}

pub(super) async fn delete_task(
    Path(id): Path<TaskId>,
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> AppResult<Json<serde_json::Value>> {
    load_visible_task(&state, &user, id).await?;

    if state.store.delete_task(id).await? {
        Ok(Json(json!({ "message": "Task deleted successfully" })))
    } else {
        Err(AppError::NotFound("Task"))
    }
}
