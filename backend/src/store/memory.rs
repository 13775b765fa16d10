use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared::automation::reconcile;
use shared::{
    CreateProjectRequest, CreateTaskRequest, CreateUserRequest, Membership, MembershipId, Project,
    ProjectId, Task, TaskId, TaskStatus, UpdateProjectRequest, UpdateTaskRequest, User, UserId,
};
use tokio::sync::RwLock;

use super::{StatusWrite, Store};
use crate::error::{StoreError, StoreResult};

/// Map-backed store. Every mutation takes the single write guard, so writes
/// to any one task are never interleaved.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    users: BTreeMap<UserId, User>,
    projects: BTreeMap<ProjectId, Project>,
    tasks: BTreeMap<TaskId, Task>,
    members: BTreeMap<MembershipId, Membership>,
    last_user_id: UserId,
    last_project_id: ProjectId,
    last_task_id: TaskId,
    last_membership_id: MembershipId,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn next_id(counter: &mut u64) -> u64 {
    *counter += 1;
    *counter
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_user(&self, id: UserId) -> StoreResult<Option<User>> {
        Ok(self.inner.read().await.users.get(&id).cloned())
    }

    async fn get_user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        let inner = self.inner.read().await;
        Ok(inner
            .users
            .values()
            .find(|user| user.username == username)
            .cloned())
    }

    async fn list_users(&self) -> StoreResult<Vec<User>> {
        Ok(self.inner.read().await.users.values().cloned().collect())
    }

    async fn create_user(&self, request: CreateUserRequest) -> StoreResult<User> {
        let mut inner = self.inner.write().await;
        if inner.users.values().any(|u| u.username == request.username) {
            return Err(StoreError::DuplicateUsername(request.username));
        }

        let user = User {
            id: next_id(&mut inner.last_user_id),
            username: request.username,
            password: request.password,
            email: request.email,
            name: request.name,
            role: request.role,
        };
        inner.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn get_project(&self, id: ProjectId) -> StoreResult<Option<Project>> {
        Ok(self.inner.read().await.projects.get(&id).cloned())
    }

    async fn list_projects(&self) -> StoreResult<Vec<Project>> {
        Ok(self.inner.read().await.projects.values().cloned().collect())
    }

    async fn list_user_projects(&self, user_id: UserId) -> StoreResult<Vec<Project>> {
        let inner = self.inner.read().await;
        Ok(inner
            .projects
            .values()
            .filter(|project| {
                project.owner_id == user_id
                    || inner
                        .members
                        .values()
                        .any(|m| m.project_id == project.id && m.user_id == user_id)
            })
            .cloned()
            .collect())
    }

    async fn create_project(
        &self,
        owner_id: UserId,
        request: CreateProjectRequest,
    ) -> StoreResult<Project> {
        let mut inner = self.inner.write().await;
        let project = Project {
            id: next_id(&mut inner.last_project_id),
            name: request.name,
            description: request.description,
            deadline: request.deadline,
            owner_id,
        };
        inner.projects.insert(project.id, project.clone());
        Ok(project)
    }

    async fn update_project(
        &self,
        id: ProjectId,
        patch: UpdateProjectRequest,
    ) -> StoreResult<Option<Project>> {
        let mut inner = self.inner.write().await;
        Ok(inner.projects.get_mut(&id).map(|project| {
            project.apply(patch);
            project.clone()
        }))
    }

    async fn delete_project(&self, id: ProjectId) -> StoreResult<bool> {
        let mut inner = self.inner.write().await;
        if inner.projects.remove(&id).is_none() {
            return Ok(false);
        }
        inner.tasks.retain(|_, task| task.project_id != id);
        inner.members.retain(|_, m| m.project_id != id);
        Ok(true)
    }

    async fn get_task(&self, id: TaskId) -> StoreResult<Option<Task>> {
        Ok(self.inner.read().await.tasks.get(&id).cloned())
    }

    async fn list_tasks(&self) -> StoreResult<Vec<Task>> {
        Ok(self.inner.read().await.tasks.values().cloned().collect())
    }

    async fn list_project_tasks(
        &self,
        project_id: ProjectId,
        status: Option<TaskStatus>,
    ) -> StoreResult<Vec<Task>> {
        let inner = self.inner.read().await;
        Ok(inner
            .tasks
            .values()
            .filter(|task| task.project_id == project_id)
            .filter(|task| status.map_or(true, |s| task.status == s))
            .cloned()
            .collect())
    }

    async fn list_user_tasks(&self, user_id: UserId) -> StoreResult<Vec<Task>> {
        let inner = self.inner.read().await;
        Ok(inner
            .tasks
            .values()
            .filter(|task| task.assignee_id == Some(user_id))
            .cloned()
            .collect())
    }

    async fn create_task(&self, request: CreateTaskRequest) -> StoreResult<Task> {
        let mut inner = self.inner.write().await;
        if !inner.projects.contains_key(&request.project_id) {
            return Err(StoreError::MissingProject(request.project_id));
        }

        let id = next_id(&mut inner.last_task_id);
        let task = Task::new(id, request, Utc::now());
        inner.tasks.insert(id, task.clone());
        Ok(task)
    }

    async fn update_task(
        &self,
        id: TaskId,
        patch: UpdateTaskRequest,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Task>> {
        let mut inner = self.inner.write().await;
        if let Some(project_id) = patch.project_id {
            if !inner.projects.contains_key(&project_id) {
                return Err(StoreError::MissingProject(project_id));
            }
        }

        Ok(inner.tasks.get_mut(&id).map(|task| {
            task.apply(patch);
            task.status = reconcile(task, now);
            task.clone()
        }))
    }

    async fn compare_and_set_status(
        &self,
        id: TaskId,
        expected: TaskStatus,
        next: TaskStatus,
    ) -> StoreResult<StatusWrite> {
        let mut inner = self.inner.write().await;
        let Some(task) = inner.tasks.get_mut(&id) else {
            return Ok(StatusWrite::NotFound);
        };

        if task.status != expected {
            return Ok(StatusWrite::Stale(task.clone()));
        }
        task.status = next;
        Ok(StatusWrite::Applied(task.clone()))
    }

    async fn delete_task(&self, id: TaskId) -> StoreResult<bool> {
        Ok(self.inner.write().await.tasks.remove(&id).is_some())
    }

    async fn add_member(&self, project_id: ProjectId, user_id: UserId) -> StoreResult<Membership> {
        let mut inner = self.inner.write().await;
        if !inner.projects.contains_key(&project_id) {
            return Err(StoreError::MissingProject(project_id));
        }
        if let Some(existing) = inner
            .members
            .values()
            .find(|m| m.project_id == project_id && m.user_id == user_id)
        {
            return Ok(existing.clone());
        }

        let membership = Membership {
            id: next_id(&mut inner.last_membership_id),
            project_id,
            user_id,
        };
        inner.members.insert(membership.id, membership.clone());
        Ok(membership)
    }

    async fn list_members(&self, project_id: ProjectId) -> StoreResult<Vec<User>> {
        let inner = self.inner.read().await;
        Ok(inner
            .members
            .values()
            .filter(|m| m.project_id == project_id)
            .filter_map(|m| inner.users.get(&m.user_id).cloned())
            .collect())
    }

    async fn is_member(&self, project_id: ProjectId, user_id: UserId) -> StoreResult<bool> {
        let inner = self.inner.read().await;
        Ok(inner
            .members
            .values()
            .any(|m| m.project_id == project_id && m.user_id == user_id))
    }

    async fn remove_member(&self, project_id: ProjectId, user_id: UserId) -> StoreResult<bool> {
        let mut inner = self.inner.write().await;
        let found = inner
            .members
            .iter()
            .find(|(_, m)| m.project_id == project_id && m.user_id == user_id)
            .map(|(id, _)| *id);

        Ok(match found {
            Some(id) => inner.members.remove(&id).is_some(),
            None => false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use shared::{Priority, Role};

    fn user(username: &str) -> CreateUserRequest {
        CreateUserRequest {
            username: username.to_string(),
            password: "hunter22".to_string(),
            email: format!("{username}@example.com"),
            name: username.to_string(),
            role: Role::User,
        }
    }

    fn project(name: &str) -> CreateProjectRequest {
        CreateProjectRequest {
            name: name.to_string(),
            description: None,
            deadline: None,
        }
    }

    fn task(project_id: ProjectId, assignee_id: Option<UserId>) -> CreateTaskRequest {
        CreateTaskRequest {
            title: "Ship it".to_string(),
            description: None,
            priority: Priority::High,
            status: TaskStatus::Todo,
            due_date: None,
            assignee_id,
            project_id,
        }
    }

    #[tokio::test]
    async fn identifiers_increment_from_one() {
        let store = MemoryStore::new();
        let first = store.create_user(user("ana")).await.unwrap();
        let second = store.create_user(user("ben")).await.unwrap();
        assert_eq!((first.id, second.id), (1, 2));

        let project = store.create_project(first.id, project("Launch")).await.unwrap();
        assert_eq!(project.id, 1);
    }

    #[tokio::test]
    async fn duplicate_usernames_are_rejected() {
        let store = MemoryStore::new();
        store.create_user(user("ana")).await.unwrap();
        let err = store.create_user(user("ana")).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateUsername(name) if name == "ana"));
    }

    #[tokio::test]
    async fn tasks_require_an_existing_project() {
        let store = MemoryStore::new();
        let err = store.create_task(task(42, None)).await.unwrap_err();
        assert!(matches!(err, StoreError::MissingProject(42)));

        let owner = store.create_user(user("ana")).await.unwrap();
        let project = store.create_project(owner.id, project("Launch")).await.unwrap();
        let created = store.create_task(task(project.id, None)).await.unwrap();

        let moved = UpdateTaskRequest {
            project_id: Some(99),
            ..UpdateTaskRequest::default()
        };
        let err = store.update_task(created.id, moved, Utc::now()).await.unwrap_err();
        assert!(matches!(err, StoreError::MissingProject(99)));
    }

    #[tokio::test]
    async fn deleting_a_project_cascades() {
        let store = MemoryStore::new();
        let owner = store.create_user(user("ana")).await.unwrap();
        let member = store.create_user(user("ben")).await.unwrap();
        let doomed = store.create_project(owner.id, project("Old")).await.unwrap();
        let kept = store.create_project(owner.id, project("New")).await.unwrap();

        store.create_task(task(doomed.id, Some(member.id))).await.unwrap();
        let survivor = store.create_task(task(kept.id, Some(member.id))).await.unwrap();
        store.add_member(doomed.id, member.id).await.unwrap();

        assert!(store.delete_project(doomed.id).await.unwrap());
        assert!(!store.delete_project(doomed.id).await.unwrap());

        assert_eq!(store.list_tasks().await.unwrap(), vec![survivor]);
        assert!(!store.is_member(doomed.id, member.id).await.unwrap());
    }

    #[tokio::test]
    async fn user_projects_include_memberships_once() {
        let store = MemoryStore::new();
        let ana = store.create_user(user("ana")).await.unwrap();
        let ben = store.create_user(user("ben")).await.unwrap();
        let owned = store.create_project(ben.id, project("Own")).await.unwrap();
        let shared = store.create_project(ana.id, project("Shared")).await.unwrap();
        store.create_project(ana.id, project("Private")).await.unwrap();

        store.add_member(shared.id, ben.id).await.unwrap();
        store.add_member(shared.id, ben.id).await.unwrap();
        store.add_member(owned.id, ben.id).await.unwrap();

        let ids: Vec<ProjectId> = store
            .list_user_projects(ben.id)
            .await
            .unwrap()
            .iter()
            .map(|p| p.id)
            .collect();
        assert_eq!(ids, vec![owned.id, shared.id]);

        let members = store.list_members(shared.id).await.unwrap();
        assert_eq!(members.len(), 1);
        assert!(store.remove_member(shared.id, ben.id).await.unwrap());
        assert!(!store.remove_member(shared.id, ben.id).await.unwrap());
    }

    #[tokio::test]
    async fn compare_and_set_only_writes_expected_status() {
        let store = MemoryStore::new();
        let owner = store.create_user(user("ana")).await.unwrap();
        let project = store.create_project(owner.id, project("Launch")).await.unwrap();
        let created = store.create_task(task(project.id, None)).await.unwrap();

        store
            .update_task(created.id, UpdateTaskRequest::status(TaskStatus::Done), Utc::now())
            .await
            .unwrap();

        let write = store
            .compare_and_set_status(created.id, TaskStatus::Todo, TaskStatus::Overdue)
            .await
            .unwrap();
        assert!(matches!(write, StatusWrite::Stale(ref t) if t.status == TaskStatus::Done));

        let write = store
            .compare_and_set_status(created.id, TaskStatus::Done, TaskStatus::Review)
            .await
            .unwrap();
        assert!(matches!(write, StatusWrite::Applied(ref t) if t.status == TaskStatus::Review));

        let missing = store
            .compare_and_set_status(404, TaskStatus::Todo, TaskStatus::Overdue)
            .await
            .unwrap();
        assert_eq!(missing, StatusWrite::NotFound);
    }

    #[tokio::test]
    async fn updates_recompute_overdue_under_the_write_guard() {
        let store = MemoryStore::new();
        let owner = store.create_user(user("ana")).await.unwrap();
        let project = store.create_project(owner.id, project("Launch")).await.unwrap();
        let now = Utc::now();
        let created = store
            .create_task(CreateTaskRequest {
                due_date: Some(now - Duration::hours(1)),
                ..task(project.id, None)
            })
            .await
            .unwrap();

        // The sweep lands between a request's read and its write.
        store
            .compare_and_set_status(created.id, TaskStatus::Todo, TaskStatus::Overdue)
            .await
            .unwrap();
        let postponed = UpdateTaskRequest {
            due_date: Some(Some(now + Duration::days(1))),
            ..UpdateTaskRequest::default()
        };
        let updated = store.update_task(created.id, postponed, now).await.unwrap().unwrap();
        assert_eq!(updated.status, TaskStatus::Todo);

        let backdated = UpdateTaskRequest {
            due_date: Some(Some(now - Duration::minutes(5))),
            ..UpdateTaskRequest::default()
        };
        let updated = store.update_task(created.id, backdated, now).await.unwrap().unwrap();
        assert_eq!(updated.status, TaskStatus::Overdue);
    }

    #[tokio::test]
    async fn project_tasks_filter_by_status() {
        let store = MemoryStore::new();
        let owner = store.create_user(user("ana")).await.unwrap();
        let project = store.create_project(owner.id, project("Launch")).await.unwrap();
        let first = store.create_task(task(project.id, None)).await.unwrap();
        store.create_task(task(project.id, None)).await.unwrap();
        store
            .update_task(first.id, UpdateTaskRequest::status(TaskStatus::Review), Utc::now())
            .await
            .unwrap();

        let review = store
            .list_project_tasks(project.id, Some(TaskStatus::Review))
            .await
            .unwrap();
        assert_eq!(review.len(), 1);
        assert_eq!(review[0].id, first.id);
        assert_eq!(store.list_project_tasks(project.id, None).await.unwrap().len(), 2);
    }
}
