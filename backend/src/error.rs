use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use shared::ProjectId;

use crate::automation::JobError;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("project {0} does not exist")]
    MissingProject(ProjectId),

    #[error("username '{0}' is already taken")]
    DuplicateUsername(String),

    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("corrupt record at '{key}': {source}")]
    Corrupt {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Errors returned by request handlers, rendered as `{ "message": ... }`.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden")]
    Forbidden,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    Conflict(String),

    #[error(transparent)]
    Store(StoreError),

    #[error(transparent)]
    Job(#[from] JobError),
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::MissingProject(_) => AppError::NotFound("Project"),
            StoreError::DuplicateUsername(_) => AppError::Conflict(err.to_string()),
            other => AppError::Store(other),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Store(_) | AppError::Job(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let message = match &self {
            AppError::Store(err) => {
                tracing::error!("store failure while handling request: {err}");
                "Server error".to_string()
            }
            AppError::Job(err) => {
                tracing::error!("automation run failed while handling request: {err}");
                "Server error".to_string()
            }
            other => other.to_string(),
        };

        (status, Json(json!({ "message": message }))).into_response()
    }
}

pub type AppResult<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_map_to_client_statuses() {
        let missing: AppError = StoreError::MissingProject(4).into();
        assert_eq!(missing.into_response().status(), StatusCode::NOT_FOUND);

        let taken: AppError = StoreError::DuplicateUsername("admin".into()).into();
        assert_eq!(taken.into_response().status(), StatusCode::CONFLICT);
    }

    #[test]
    fn corrupt_records_are_server_errors() {
        let source = serde_json::from_str::<shared::Task>("{").unwrap_err();
        let err: AppError = StoreError::Corrupt {
            key: "task:1".into(),
            source,
        }
        .into();
        assert_eq!(err.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
