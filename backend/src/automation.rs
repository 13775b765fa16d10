//! Store-facing side of the deadline automation: the overdue sweep and the
//! per-user reminder and summary dispatch. Each task or user is handled on
//! its own; a failure is logged and counted and the run moves on.

use chrono::{DateTime, Utc};
use serde::Serialize;
use shared::automation::{classify, select_reminders, summarize};
use shared::{Task, TaskStatus};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::AutomationConfig;
use crate::error::StoreError;
use crate::notify::Notifier;
use crate::store::{StatusWrite, Store};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum JobKind {
    OverdueSweep,
    Reminders,
    Summaries,
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            JobKind::OverdueSweep => "overdue sweep",
            JobKind::Reminders => "reminders",
            JobKind::Summaries => "daily summaries",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobReport {
    pub run_id: Uuid,
    pub job: JobKind,
    /// Tasks or users looked at.
    pub processed: usize,
    /// Tasks updated or notifications sent.
    pub changed: usize,
    pub failures: usize,
}

impl JobReport {
    fn new(job: JobKind) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            job,
            processed: 0,
            changed: 0,
            failures: 0,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("{job} could not load its work set: {source}")]
    Store {
        job: JobKind,
        #[source]
        source: StoreError,
    },

    #[error("{job} did not finish within {secs}s")]
    TimedOut { job: JobKind, secs: u64 },
}

#[derive(Debug, Clone, Serialize)]
pub struct Sweep {
    #[serde(flatten)]
    pub report: JobReport,
    pub updated: Vec<Task>,
}

/// Marks every past-due, unfinished task as overdue.
///
/// Writes go through compare-and-set on the status that was read, so a task
/// finished in the meantime keeps its new status.
pub async fn sweep_overdue(store: &dyn Store, now: DateTime<Utc>) -> Result<Sweep, JobError> {
    let job = JobKind::OverdueSweep;
    let tasks = store
        .list_tasks()
        .await
        .map_err(|source| JobError::Store { job, source })?;

    let mut report = JobReport::new(job);
    let mut updated = Vec::new();

    for task in tasks {
        report.processed += 1;
        if task.status == TaskStatus::Overdue || classify(&task, now) != TaskStatus::Overdue {
            continue;
        }

        match store
            .compare_and_set_status(task.id, task.status, TaskStatus::Overdue)
            .await
        {
            Ok(StatusWrite::Applied(task)) => {
                report.changed += 1;
                updated.push(task);
            }
            Ok(StatusWrite::Stale(current)) => {
                debug!(
                    "task {} changed to {} during the sweep, leaving it",
                    current.id, current.status
                );
            }
            Ok(StatusWrite::NotFound) => {
                report.failures += 1;
                warn!("task {} disappeared before it could be marked overdue", task.id);
            }
            Err(err) => {
                report.failures += 1;
                warn!("failed to mark task {} overdue: {err}", task.id);
            }
        }
    }

    info!(
        run_id = %report.run_id,
        "updated {} overdue tasks ({} failures)",
        report.changed,
        report.failures
    );
    Ok(Sweep { report, updated })
}

pub async fn dispatch_reminders(
    store: &dyn Store,
    notifier: &dyn Notifier,
    config: &AutomationConfig,
    now: DateTime<Utc>,
) -> Result<JobReport, JobError> {
    let job = JobKind::Reminders;
    let users = store
        .list_users()
        .await
        .map_err(|source| JobError::Store { job, source })?;
    let window = config.reminder_window();

    let mut report = JobReport::new(job);
    for user in users {
        report.processed += 1;
        let tasks = match store.list_user_tasks(user.id).await {
            Ok(tasks) => tasks,
            Err(err) => {
                report.failures += 1;
                warn!("could not load tasks for user {}: {err}", user.username);
                continue;
            }
        };

        let upcoming = select_reminders(&tasks, now, &window);
        if upcoming.is_empty() {
            continue;
        }

        match notifier.send_reminders(&user, &upcoming).await {
            Ok(()) => report.changed += 1,
            Err(err) => {
                report.failures += 1;
                warn!("reminder for user {} failed: {err}", user.username);
            }
        }
    }

    info!(
        run_id = %report.run_id,
        "sent {} reminders ({} failures)",
        report.changed,
        report.failures
    );
    Ok(report)
}

pub async fn dispatch_summaries(
    store: &dyn Store,
    notifier: &dyn Notifier,
    config: &AutomationConfig,
    now: DateTime<Utc>,
) -> Result<JobReport, JobError> {
    let job = JobKind::Summaries;
    let users = store
        .list_users()
        .await
        .map_err(|source| JobError::Store { job, source })?;
    let horizon = config.due_soon_horizon();

    let mut report = JobReport::new(job);
    for user in users {
        report.processed += 1;
        let tasks = match store.list_user_tasks(user.id).await {
            Ok(tasks) => tasks,
            Err(err) => {
                report.failures += 1;
                warn!("could not load tasks for user {}: {err}", user.username);
                continue;
            }
        };

        let summary = summarize(&tasks, now, horizon);
        match notifier.send_summary(&user, &summary).await {
            Ok(()) => report.changed += 1,
            Err(err) => {
                report.failures += 1;
                warn!("summary for user {} failed: {err}", user.username);
            }
        }
    }

    info!(
        run_id = %report.run_id,
        "sent {} daily summaries ({} failures)",
        report.changed,
        report.failures
    );
    Ok(report)
}
