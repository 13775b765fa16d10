//! Caller identification and the single authorization check every handler
//! goes through.
//!
//! Sessions and passwords are handled in front of this service; requests
//! arrive with the authenticated user's id in the `x-user-id` header.

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use shared::{Project, User, UserId};

use crate::error::{AppError, AppResult};
use crate::routes::AppState;

pub const USER_HEADER: &str = "x-user-id";

/// The authenticated caller.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> AppResult<Self> {
        let id: UserId = parts
            .headers
            .get(USER_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse().ok())
            .ok_or(AppError::Unauthorized)?;

        let user = state
            .store
            .get_user(id)
            .await?
            .ok_or(AppError::Unauthorized)?;
        Ok(CurrentUser(user))
    }
}

/// What a user is to a particular project.
#[derive(Debug, Clone, Copy)]
pub struct ProjectAccess<'a> {
    pub project: &'a Project,
    pub is_member: bool,
}

#[derive(Debug, Clone, Copy)]
pub enum Capability<'a> {
    /// List or create user accounts.
    ManageUsers,
    /// See every project, not just the caller's own.
    ViewAllProjects,
    /// Read the project and work on its tasks.
    ViewProject(ProjectAccess<'a>),
    /// Rename, delete or change the membership of the project.
    ManageProject(ProjectAccess<'a>),
}

/// Admins may do anything. Owners manage their projects, members may view
/// and work on them.
pub fn authorize(user: &User, capability: Capability<'_>) -> AppResult<()> {
    if user.is_admin() {
        return Ok(());
    }

    let allowed = match capability {
        Capability::ManageUsers | Capability::ViewAllProjects => false,
        Capability::ViewProject(access) => access.project.owner_id == user.id || access.is_member,
        Capability::ManageProject(access) => access.project.owner_id == user.id,
    };

    if allowed {
        Ok(())
    } else {
        Err(AppError::Forbidden)
    }
}
