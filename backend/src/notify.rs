use async_trait::async_trait;
use shared::{Task, TaskSummary, User};
use tracing::info;

#[derive(Debug, thiserror::Error)]
#[error("notification delivery failed: {0}")]
pub struct NotifyError(pub String);

/// Delivery channel for scheduler output (email, push, ...).
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_reminders(&self, user: &User, tasks: &[Task]) -> Result<(), NotifyError>;

    async fn send_summary(&self, user: &User, summary: &TaskSummary) -> Result<(), NotifyError>;
}

/// Writes notifications to the log instead of delivering them.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_reminders(&self, user: &User, tasks: &[Task]) -> Result<(), NotifyError> {
        info!(
            user = %user.username,
            count = tasks.len(),
            "sending reminder for upcoming tasks"
        );
        for task in tasks {
            info!(
                user = %user.username,
                task_id = task.id,
                due = ?task.due_date,
                "  \"{}\"",
                task.title
            );
        }
        Ok(())
    }

    async fn send_summary(&self, user: &User, summary: &TaskSummary) -> Result<(), NotifyError> {
        info!(
            user = %user.username,
            todo = summary.todo,
            in_progress = summary.in_progress,
            review = summary.review,
            done = summary.done,
            overdue = summary.overdue,
            due_soon = summary.due_soon,
            total = summary.total,
            "sending daily summary"
        );
        Ok(())
    }
}
