use axum::{extract::State, http::StatusCode, response::Json};
use shared::{CreateUserRequest, UserProfile};

use super::{require_text, AppState};
use crate::auth::{authorize, Capability, CurrentUser};
use crate::error::{AppError, AppResult};

pub(super) async fn current_user(CurrentUser(user): CurrentUser) -> Json<UserProfile> {
    Json(user.into())
}

pub(super) async fn list_users(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> AppResult<Json<Vec<UserProfile>>> {
    authorize(&user, Capability::ManageUsers)?;

    let users = state.store.list_users().await?;
    Ok(Json(users.into_iter().map(UserProfile::from).collect()))
}

pub(super) async fn create_user(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(payload): Json<CreateUserRequest>,
) -> AppResult<(StatusCode, Json<UserProfile>)> {
    authorize(&user, Capability::ManageUsers)?;

    require_text("username", &payload.username)?;
    require_text("name", &payload.name)?;
    if payload.password.chars().count() < 6 {
        return Err(AppError::BadRequest(
            "Password must be at least 6 characters".to_string(),
        ));
    }
    if !payload.email.contains('@') {
        return Err(AppError::BadRequest("Invalid email address".to_string()));
    }

    let created = state.store.create_user(payload).await?;
    tracing::info!("user '{}' created by {}", created.username, user.username);
    Ok((StatusCode::CREATED, Json(created.into())))
}
