//! Persistence boundary for users, projects, tasks and memberships.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared::{
    CreateProjectRequest, CreateTaskRequest, CreateUserRequest, Membership, Project, ProjectId,
    Role, Task, TaskId, TaskStatus, UpdateProjectRequest, UpdateTaskRequest, User, UserId,
};
use tracing::info;

use crate::config::{StorageBackend, StorageConfig};
use crate::error::StoreResult;

mod memory;
mod redis_store;

pub use self::memory::MemoryStore;
pub use self::redis_store::RedisStore;

/// Outcome of [`Store::compare_and_set_status`].
#[derive(Debug, Clone, PartialEq)]
pub enum StatusWrite {
    Applied(Task),
    /// The stored status no longer matched the expected one; nothing was written.
    Stale(Task),
    NotFound,
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn get_user(&self, id: UserId) -> StoreResult<Option<User>>;
    async fn get_user_by_username(&self, username: &str) -> StoreResult<Option<User>>;
    async fn list_users(&self) -> StoreResult<Vec<User>>;
    async fn create_user(&self, request: CreateUserRequest) -> StoreResult<User>;

    async fn get_project(&self, id: ProjectId) -> StoreResult<Option<Project>>;
    async fn list_projects(&self) -> StoreResult<Vec<Project>>;
    /// Projects the user owns or is a member of, ordered by id.
    async fn list_user_projects(&self, user_id: UserId) -> StoreResult<Vec<Project>>;
    async fn create_project(
        &self,
        owner_id: UserId,
        request: CreateProjectRequest,
    ) -> StoreResult<Project>;
    async fn update_project(
        &self,
        id: ProjectId,
        patch: UpdateProjectRequest,
    ) -> StoreResult<Option<Project>>;
    /// Removes the project along with its tasks and memberships.
    async fn delete_project(&self, id: ProjectId) -> StoreResult<bool>;

    async fn get_task(&self, id: TaskId) -> StoreResult<Option<Task>>;
    async fn list_tasks(&self) -> StoreResult<Vec<Task>>;
    async fn list_project_tasks(
        &self,
        project_id: ProjectId,
        status: Option<TaskStatus>,
    ) -> StoreResult<Vec<Task>>;
    /// Tasks assigned to the user.
    async fn list_user_tasks(&self, user_id: UserId) -> StoreResult<Vec<Task>>;
    async fn create_task(&self, request: CreateTaskRequest) -> StoreResult<Task>;
    /// Applies the patch and recomputes the derived `overdue` status as of
    /// `now`, in the same write.
    async fn update_task(
        &self,
        id: TaskId,
        patch: UpdateTaskRequest,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Task>>;
    /// Writes `next` only if the stored status is still `expected`.
    async fn compare_and_set_status(
        &self,
        id: TaskId,
        expected: TaskStatus,
        next: TaskStatus,
    ) -> StoreResult<StatusWrite>;
    async fn delete_task(&self, id: TaskId) -> StoreResult<bool>;

    async fn add_member(&self, project_id: ProjectId, user_id: UserId) -> StoreResult<Membership>;
    async fn list_members(&self, project_id: ProjectId) -> StoreResult<Vec<User>>;
    async fn is_member(&self, project_id: ProjectId, user_id: UserId) -> StoreResult<bool>;
    async fn remove_member(&self, project_id: ProjectId, user_id: UserId) -> StoreResult<bool>;
}

pub type SharedStore = Arc<dyn Store>;

pub async fn connect(config: &StorageConfig) -> anyhow::Result<SharedStore> {
    let store: SharedStore = match config.backend {
        StorageBackend::Memory => {
            info!("using in-memory storage");
            Arc::new(MemoryStore::new())
        }
        StorageBackend::Redis => {
            info!("using redis storage at {}", config.redis_url);
            Arc::new(RedisStore::connect(&config.redis_url).await?)
        }
    };

    if config.seed_sample_data {
        seed_sample_data(store.as_ref()).await?;
    }

    Ok(store)
}

/// Inserts the default admin and sample accounts unless they already exist.
pub async fn seed_sample_data(store: &dyn Store) -> StoreResult<()> {
    let accounts = [
        CreateUserRequest {
            username: "admin".to_string(),
            password: "password".to_string(),
            email: "admin@taskflow.com".to_string(),
            name: "Admin User".to_string(),
            role: Role::Admin,
        },
        CreateUserRequest {
            username: "alexmorgan".to_string(),
            password: "password".to_string(),
            email: "alex@example.com".to_string(),
            name: "Alex Morgan".to_string(),
            role: Role::User,
        },
    ];

    for account in accounts {
        if store.get_user_by_username(&account.username).await?.is_none() {
            let user = store.create_user(account).await?;
            info!("seeded user '{}' (id {})", user.username, user.id);
        }
    }

    Ok(())
}
