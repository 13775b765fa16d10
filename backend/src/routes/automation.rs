use std::collections::HashMap;

use axum::{
    extract::{Query, State},
    response::Json,
};
use chrono::Utc;
use serde::Deserialize;
use shared::automation::{select_reminders, summarize};
use shared::{ProjectId, Task, TaskSummary, User};

use super::{AppState, LoadedProject};
use crate::auth::{authorize, Capability, CurrentUser};
use crate::automation::{sweep_overdue, Sweep};
use crate::error::{AppError, AppResult};

#[derive(Debug, Default, Deserialize)]
pub(super) struct RemindersQuery {
    limit: Option<usize>,
}

/// Tasks assigned to the caller that fall due within the reminder window,
/// soonest first.
pub(super) async fn task_reminders(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<RemindersQuery>,
) -> AppResult<Json<Vec<Task>>> {
    let tasks = state.store.list_user_tasks(user.id).await?;
    let mut upcoming = select_reminders(&tasks, Utc::now(), &state.automation.reminder_window());
    if let Some(limit) = query.limit {
        upcoming.truncate(limit);
    }
    Ok(Json(upcoming))
}

pub(super) async fn daily_summary(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> AppResult<Json<TaskSummary>> {
    let tasks = state.store.list_user_tasks(user.id).await?;
    let summary = summarize(&tasks, Utc::now(), state.automation.due_soon_horizon());
    Ok(Json(summary))
}

/// Runs the overdue sweep on demand; the UI polls this between scheduled runs.
///
/// The sweep covers every task, but the response only lists the updated
/// tasks the caller may view. The report counts stay global.
pub(super) async fn update_overdue(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> AppResult<Json<Sweep>> {
    let mut sweep = sweep_overdue(state.store.as_ref(), Utc::now()).await?;

    let mut visible: HashMap<ProjectId, bool> = HashMap::new();
    let mut updated = Vec::with_capacity(sweep.updated.len());
    for task in std::mem::take(&mut sweep.updated) {
        let can_view = match visible.get(&task.project_id) {
            Some(&can_view) => can_view,
            None => {
                let can_view = can_view_project(&state, &user, task.project_id).await?;
                visible.insert(task.project_id, can_view);
                can_view
            }
        };
        if can_view {
            updated.push(task);
        }
    }
    sweep.updated = updated;

    Ok(Json(sweep))
}

async fn can_view_project(state: &AppState, user: &User, id: ProjectId) -> AppResult<bool> {
    let loaded = match LoadedProject::load(state, user, id).await {
        Ok(loaded) => loaded,
        // Deleted since the sweep ran.
        Err(AppError::NotFound(_)) => return Ok(false),
        Err(err) => return Err(err),
    };
    match authorize(user, Capability::ViewProject(loaded.access())) {
        Ok(()) => Ok(true),
        Err(AppError::Forbidden) => Ok(false),
        Err(err) => Err(err),
    }
}
