use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use serde::Deserialize;
use serde_json::json;
use shared::{
    AddMemberRequest, CreateProjectRequest, Membership, Project, ProjectId, Task, TaskStatus,
    UpdateProjectRequest, UserId, UserProfile,
};

use super::{require_text, AppState, LoadedProject};
use crate::auth::{authorize, Capability, CurrentUser};
use crate::error::{AppError, AppResult};

#[derive(Debug, Default, Deserialize)]
pub(super) struct ListProjectsQuery {
    #[serde(default)]
    all: bool,
}

pub(super) async fn list_projects(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<ListProjectsQuery>,
) -> AppResult<Json<Vec<Project>>> {
    let projects = if query.all {
        authorize(&user, Capability::ViewAllProjects)?;
        state.store.list_projects().await?
    } else {
        state.store.list_user_projects(user.id).await?
    };
    Ok(Json(projects))
}

pub(super) async fn create_project(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(payload): Json<CreateProjectRequest>,
) -> AppResult<(StatusCode, Json<Project>)> {
    require_text("name", &payload.name)?;

    let project = state.store.create_project(user.id, payload).await?;
    tracing::debug!("project {} created by {}", project.id, user.username);
    Ok((StatusCode::CREATED, Json(project)))
}

pub(super) async fn get_project(
    Path(id): Path<ProjectId>,
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> AppResult<Json<Project>> {
    let loaded = LoadedProject::load(&state, &user, id).await?;
    authorize(&user, Capability::ViewProject(loaded.access()))?;
    Ok(Json(loaded.project))
}

pub(super) async fn update_project(
    Path(id): Path<ProjectId>,
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(payload): Json<UpdateProjectRequest>,
) -> AppResult<Json<Project>> {
    let loaded = LoadedProject::load(&state, &user, id).await?;
    authorize(&user, Capability::ManageProject(loaded.access()))?;
    if let Some(name) = &payload.name {
        require_text("name", name)?;
    }

    state
        .store
        .update_project(id, payload)
        .await?
        .map(Json)
        .ok_or(AppError::NotFound("Project"))
}

pub(super) async fn delete_project(
    Path(id): Path<ProjectId>,
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> AppResult<Json<serde_json::Value>> {
    let loaded = LoadedProject::load(&state, &user, id).await?;
    authorize(&user, Capability::ManageProject(loaded.access()))?;

    if state.store.delete_project(id).await? {
        Ok(Json(json!({ "message": "Project deleted successfully" })))
    } else {
        Err(AppError::NotFound("Project"))
    }
}

#[derive(Debug, Default, Deserialize)]
pub(super) struct ProjectTasksQuery {
    status: Option<TaskStatus>,
}

pub(super) async fn project_tasks(
    Path(id): Path<ProjectId>,
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<ProjectTasksQuery>,
) -> AppResult<Json<Vec<Task>>> {
    let loaded = LoadedProject::load(&state, &user, id).await?;
    authorize(&user, Capability::ViewProject(loaded.access()))?;

    let tasks = state.store.list_project_tasks(id, query.status).await?;
    Ok(Json(tasks))
}

pub(super) async fn list_members(
    Path(id): Path<ProjectId>,
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> AppResult<Json<Vec<UserProfile>>> {
    let loaded = LoadedProject::load(&state, &user, id).await?;
    authorize(&user, Capability::ViewProject(loaded.access()))?;

    let members = state.store.list_members(id).await?;
    Ok(Json(members.into_iter().map(UserProfile::from).collect()))
}

pub(super) async fn add_member(
    Path(id): Path<ProjectId>,
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(payload): Json<AddMemberRequest>,
) -> AppResult<(StatusCode, Json<Membership>)> {
    let loaded = LoadedProject::load(&state, &user, id).await?;
    authorize(&user, Capability::ManageProject(loaded.access()))?;

    if state.store.get_user(payload.user_id).await?.is_none() {
        return Err(AppError::NotFound("User"));
    }

    let membership = state.store.add_member(id, payload.user_id).await?;
    Ok((StatusCode::CREATED, Json(membership)))
}

pub(super) async fn remove_member(
    Path((id, member_id)): Path<(ProjectId, UserId)>,
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> AppResult<Json<serde_json::Value>> {
    let loaded = LoadedProject::load(&state, &user, id).await?;
    authorize(&user, Capability::ManageProject(loaded.access()))?;

    if state.store.remove_member(id, member_id).await? {
        Ok(Json(json!({ "message": "Member removed successfully" })))
    } else {
        Err(AppError::NotFound("Membership"))
    }
}
