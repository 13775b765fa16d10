use axum::{
    response::Json,
    routing::{delete, get},
    Router,
};
use serde_json::json;
use shared::{Project, ProjectId, User};
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

use crate::auth::ProjectAccess;
use crate::config::{AutomationConfig, ServerConfig};
use crate::error::{AppError, AppResult};
use crate::store::SharedStore;

mod automation;
mod projects;
mod tasks;
mod users;

#[derive(Clone)]
pub struct AppState {
    pub store: SharedStore,
    pub automation: AutomationConfig,
}

pub fn router(state: AppState, server: &ServerConfig) -> Router {
    let mut app = Router::new()
        .route("/health", get(health))
        .route("/api/user", get(users::current_user))
        .route("/api/users", get(users::list_users).post(users::create_user))
        .route(
            "/api/projects",
            get(projects::list_projects).post(projects::create_project),
        )
        .route(
            "/api/projects/:id",
            get(projects::get_project)
                .put(projects::update_project)
                .delete(projects::delete_project),
        )
        .route("/api/projects/:id/tasks", get(projects::project_tasks))
        .route(
            "/api/projects/:id/members",
            get(projects::list_members).post(projects::add_member),
        )
        .route(
            "/api/projects/:id/members/:user_id",
            delete(projects::remove_member),
        )
        .route("/api/tasks", get(tasks::my_tasks).post(tasks::create_task))
        .route(
            "/api/tasks/:id",
            get(tasks::get_task)
                .put(tasks::update_task)
                .delete(tasks::delete_task),
        )
        .route(
            "/api/automation/task-reminders",
            get(automation::task_reminders),
        )
        .route("/api/automation/daily-summary", get(automation::daily_summary))
        .route(
            "/api/automation/update-overdue",
            get(automation::update_overdue).post(automation::update_overdue),
        )
        .with_state(state);

    if let Some(dir) = &server.static_dir {
        app = app.fallback_service(ServeDir::new(dir));
    }

    app.layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

/// A project together with the caller's relationship to it.
pub(crate) struct LoadedProject {
    pub project: Project,
    pub is_member: bool,
}

impl LoadedProject {
    pub async fn load(state: &AppState, user: &User, id: ProjectId) -> AppResult<Self> {
        let project = state
            .store
            .get_project(id)
            .await?
            .ok_or(AppError::NotFound("Project"))?;
        let is_member = state.store.is_member(id, user.id).await?;
        Ok(Self { project, is_member })
    }

    pub fn access(&self) -> ProjectAccess<'_> {
        ProjectAccess {
            project: &self.project,
            is_member: self.is_member,
        }
    }
}

pub(crate) fn require_text(field: &str, value: &str) -> AppResult<()> {
    if value.trim().is_empty() {
        return Err(AppError::BadRequest(format!("{field} is required")));
    }
    Ok(())
}
