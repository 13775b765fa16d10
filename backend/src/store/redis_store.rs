use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::{aio::MultiplexedConnection, AsyncCommands, Client};
use serde::{de::DeserializeOwned, Serialize};
use shared::automation::reconcile;
use shared::{
    CreateProjectRequest, CreateTaskRequest, CreateUserRequest, Membership, Project, ProjectId,
    Task, TaskId, TaskStatus, UpdateProjectRequest, UpdateTaskRequest, User, UserId,
};
use tokio::sync::Mutex;

use super::{StatusWrite, Store};
use crate::error::{StoreError, StoreResult};

/// A value kept as a JSON string under `{PREFIX}:{id}`.
trait Record: Serialize + DeserializeOwned + Send + Sync {
    const PREFIX: &'static str;

    fn id(&self) -> u64;

    fn key_for(id: u64) -> String {
        format!("{}:{}", Self::PREFIX, id)
    }
}

impl Record for User {
    const PREFIX: &'static str = "user";

    fn id(&self) -> u64 {
        self.id
    }
}

impl Record for Project {
    const PREFIX: &'static str = "project";

    fn id(&self) -> u64 {
        self.id
    }
}

impl Record for Task {
    const PREFIX: &'static str = "task";

    fn id(&self) -> u64 {
        self.id
    }
}

impl Record for Membership {
    const PREFIX: &'static str = "member";

    fn id(&self) -> u64 {
        self.id
    }
}

/// Redis-backed store. Writes go through `write_lock` so this process never
/// has two read-modify-write cycles in flight at once.
pub struct RedisStore {
    conn: MultiplexedConnection,
    write_lock: Mutex<()>,
}

impl RedisStore {
    pub async fn connect(redis_url: &str) -> StoreResult<Self> {
        let client = Client::open(redis_url)?;
        let conn = client.get_multiplexed_tokio_connection().await?;
        Ok(Self {
            conn,
            write_lock: Mutex::new(()),
        })
    }

    async fn next_id<T: Record>(&self) -> StoreResult<u64> {
        let mut conn = self.conn.clone();
        let id: u64 = conn.incr(format!("next:{}", T::PREFIX), 1).await?;
        Ok(id)
    }

    async fn load<T: Record>(&self, id: u64) -> StoreResult<Option<T>> {
        let mut conn = self.conn.clone();
        let key = T::key_for(id);
        let json: Option<String> = conn.get(&key).await?;
        json.map(|json| decode(&key, &json)).transpose()
    }

    async fn load_all<T: Record>(&self) -> StoreResult<Vec<T>> {
        let mut conn = self.conn.clone();
        let keys: Vec<String> = conn.keys(format!("{}:*", T::PREFIX)).await?;

        let mut records = Vec::with_capacity(keys.len());
        for key in keys {
            let json: Option<String> = conn.get(&key).await?;
            if let Some(json) = json {
                records.push(decode::<T>(&key, &json)?);
            }
        }
        records.sort_by_key(|record| record.id());
        Ok(records)
    }

    async fn save<T: Record>(&self, record: &T) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        let key = T::key_for(record.id());
        let json = serde_json::to_string(record).map_err(|source| StoreError::Corrupt {
            key: key.clone(),
            source,
        })?;
        let _: () = conn.set(&key, json).await?;
        Ok(())
    }

    async fn remove<T: Record>(&self, id: u64) -> StoreResult<bool> {
        let mut conn = self.conn.clone();
        let deleted: usize = conn.del(T::key_for(id)).await?;
        Ok(deleted > 0)
    }

    async fn find_membership(
        &self,
        project_id: ProjectId,
        user_id: UserId,
    ) -> StoreResult<Option<Membership>> {
        Ok(self
            .load_all::<Membership>()
            .await?
            .into_iter()
            .find(|m| m.project_id == project_id && m.user_id == user_id))
    }
}

fn decode<T: DeserializeOwned>(key: &str, json: &str) -> StoreResult<T> {
    serde_json::from_str(json).map_err(|source| StoreError::Corrupt {
        key: key.to_string(),
        source,
    })
}

#[async_trait]
impl Store for RedisStore {
    async fn get_user(&self, id: UserId) -> StoreResult<Option<User>> {
        self.load(id).await
    }

    async fn get_user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        Ok(self
            .load_all::<User>()
            .await?
            .into_iter()
            .find(|user| user.username == username))
    }

    async fn list_users(&self) -> StoreResult<Vec<User>> {
        self.load_all().await
    }

    async fn create_user(&self, request: CreateUserRequest) -> StoreResult<User> {
        let _guard = self.write_lock.lock().await;
        if self.get_user_by_username(&request.username).await?.is_some() {
            return Err(StoreError::DuplicateUsername(request.username));
        }

        let user = User {
            id: self.next_id::<User>().await?,
            username: request.username,
            password: request.password,
            email: request.email,
            name: request.name,
            role: request.role,
        };
        self.save(&user).await?;
        Ok(user)
    }

    async fn get_project(&self, id: ProjectId) -> StoreResult<Option<Project>> {
        self.load(id).await
    }

    async fn list_projects(&self) -> StoreResult<Vec<Project>> {
        self.load_all().await
    }

    async fn list_user_projects(&self, user_id: UserId) -> StoreResult<Vec<Project>> {
        let member_of: Vec<ProjectId> = self
            .load_all::<Membership>()
            .await?
            .into_iter()
            .filter(|m| m.user_id == user_id)
            .map(|m| m.project_id)
            .collect();

        Ok(self
            .load_all::<Project>()
            .await?
            .into_iter()
            .filter(|p| p.owner_id == user_id || member_of.contains(&p.id))
            .collect())
    }

    async fn create_project(
        &self,
        owner_id: UserId,
        request: CreateProjectRequest,
    ) -> StoreResult<Project> {
        let _guard = self.write_lock.lock().await;
        let project = Project {
            id: self.next_id::<Project>().await?,
            name: request.name,
            description: request.description,
            deadline: request.deadline,
            owner_id,
        };
        self.save(&project).await?;
        Ok(project)
    }

    async fn update_project(
        &self,
        id: ProjectId,
        patch: UpdateProjectRequest,
    ) -> StoreResult<Option<Project>> {
        let _guard = self.write_lock.lock().await;
        let Some(mut project) = self.load::<Project>(id).await? else {
            return Ok(None);
        };
        project.apply(patch);
        self.save(&project).await?;
        Ok(Some(project))
    }

    async fn delete_project(&self, id: ProjectId) -> StoreResult<bool> {
        let _guard = self.write_lock.lock().await;
        if !self.remove::<Project>(id).await? {
            return Ok(false);
        }

        for task in self.load_all::<Task>().await? {
            if task.project_id == id {
                self.remove::<Task>(task.id).await?;
            }
        }
        for membership in self.load_all::<Membership>().await? {
            if membership.project_id == id {
                self.remove::<Membership>(membership.id).await?;
            }
        }
        Ok(true)
    }

    async fn get_task(&self, id: TaskId) -> StoreResult<Option<Task>> {
        self.load(id).await
    }

    async fn list_tasks(&self) -> StoreResult<Vec<Task>> {
        self.load_all().await
    }

    async fn list_project_tasks(
        &self,
        project_id: ProjectId,
        status: Option<TaskStatus>,
    ) -> StoreResult<Vec<Task>> {
        Ok(self
            .load_all::<Task>()
            .await?
            .into_iter()
            .filter(|task| task.project_id == project_id)
            .filter(|task| status.map_or(true, |s| task.status == s))
            .collect())
    }

    async fn list_user_tasks(&self, user_id: UserId) -> StoreResult<Vec<Task>> {
        Ok(self
            .load_all::<Task>()
            .await?
            .into_iter()
            .filter(|task| task.assignee_id == Some(user_id))
            .collect())
    }

    async fn create_task(&self, request: CreateTaskRequest) -> StoreResult<Task> {
        let _guard = self.write_lock.lock().await;
        if self.load::<Project>(request.project_id).await?.is_none() {
            return Err(StoreError::MissingProject(request.project_id));
        }

        let id = self.next_id::<Task>().await?;
        let task = Task::new(id, request, Utc::now());
        self.save(&task).await?;
        Ok(task)
    }

    async fn update_task(
        &self,
        id: TaskId,
        patch: UpdateTaskRequest,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Task>> {
        let _guard = self.write_lock.lock().await;
        if let Some(project_id) = patch.project_id {
            if self.load::<Project>(project_id).await?.is_none() {
                return Err(StoreError::MissingProject(project_id));
            }
        }

        let Some(mut task) = self.load::<Task>(id).await? else {
            return Ok(None);
        };
        task.apply(patch);
        task.status = reconcile(&task, now);
        self.save(&task).await?;
        Ok(Some(task))
    }

    async fn compare_and_set_status(
        &self,
        id: TaskId,
        expected: TaskStatus,
        next: TaskStatus,
    ) -> StoreResult<StatusWrite> {
        let _guard = self.write_lock.lock().await;
        let Some(mut task) = self.load::<Task>(id).await? else {
            return Ok(StatusWrite::NotFound);
        };

        if task.status != expected {
            return Ok(StatusWrite::Stale(task));
        }
        task.status = next;
        self.save(&task).await?;
        Ok(StatusWrite::Applied(task))
    }

    async fn delete_task(&self, id: TaskId) -> StoreResult<bool> {
        let _guard = self.write_lock.lock().await;
        self.remove::<Task>(id).await
    }

    async fn add_member(&self, project_id: ProjectId, user_id: UserId) -> StoreResult<Membership> {
        let _guard = self.write_lock.lock().await;
        if self.load::<Project>(project_id).await?.is_none() {
            return Err(StoreError::MissingProject(project_id));
        }
        if let Some(existing) = self.find_membership(project_id, user_id).await? {
            return Ok(existing);
        }

        let membership = Membership {
            id: self.next_id::<Membership>().await?,
            project_id,
            user_id,
        };
        self.save(&membership).await?;
        Ok(membership)
    }

    async fn list_members(&self, project_id: ProjectId) -> StoreResult<Vec<User>> {
        let mut members = Vec::new();
        for membership in self.load_all::<Membership>().await? {
            if membership.project_id != project_id {
                continue;
            }
            if let Some(user) = self.load::<User>(membership.user_id).await? {
                members.push(user);
            }
        }
        Ok(members)
    }

    async fn is_member(&self, project_id: ProjectId, user_id: UserId) -> StoreResult<bool> {
        Ok(self.find_membership(project_id, user_id).await?.is_some())
    }

    async fn remove_member(&self, project_id: ProjectId, user_id: UserId) -> StoreResult<bool> {
        let _guard = self.write_lock.lock().await;
        match self.find_membership(project_id, user_id).await? {
            Some(membership) => self.remove::<Membership>(membership.id).await,
            None => Ok(false),
        }
    }
}
