//! Deadline automation: overdue classification, reminder selection and
//! per-user summaries.
//!
//! Everything here is a pure function of its inputs and a caller-supplied
//! "now", so the scheduler and the request handlers share the same rules.

use chrono::{DateTime, Duration, Utc};

use crate::{Task, TaskStatus, TaskSummary};

pub const REMINDER_HORIZON_HOURS: i64 = 24;
pub const DUE_SOON_HORIZON_HOURS: i64 = 48;

/// Returns the status `task` should have at `now`.
///
/// Done tasks and tasks without a due date are left as they are. Any other
/// task whose due date has passed becomes [`TaskStatus::Overdue`].
pub fn classify(task: &Task, now: DateTime<Utc>) -> TaskStatus {
    if is_past_due(task, now) {
        TaskStatus::Overdue
    } else {
        task.status
    }
}

/// Like [`classify`], but also clears an `overdue` status that no longer
/// holds because the due date was moved out or removed.
pub fn reconcile(task: &Task, now: DateTime<Utc>) -> TaskStatus {
    match classify(task, now) {
        TaskStatus::Overdue if !is_past_due(task, now) => TaskStatus::Todo,
        status => status,
    }
}

fn is_past_due(task: &Task, now: DateTime<Utc>) -> bool {
    if task.status == TaskStatus::Done {
        return false;
    }
    matches!(task.due_date, Some(due) if due < now)
}

/// True when the task is due in `(now, now + horizon]`. A horizon reaching
/// past the last representable instant has no upper bound.
pub fn due_within(task: &Task, now: DateTime<Utc>, horizon: Duration) -> bool {
    match task.due_date {
        Some(due) => {
            due > now
                && now
                    .checked_add_signed(horizon)
                    .map_or(true, |end| due <= end)
        }
        None => false,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReminderWindow {
    pub horizon: Duration,
    /// Whether tasks already marked overdue are reminded about again.
    pub include_overdue: bool,
}

impl Default for ReminderWindow {
    fn default() -> Self {
        Self {
            horizon: Duration::hours(REMINDER_HORIZON_HOURS),
            include_overdue: true,
        }
    }
}

/// Tasks that are not done and fall due inside the reminder window, soonest
/// first (ties broken by id). Finished work is never reminded about, whatever
/// its due date.
pub fn select_reminders(tasks: &[Task], now: DateTime<Utc>, window: &ReminderWindow) -> Vec<Task> {
    let mut selected: Vec<Task> = tasks
        .iter()
        .filter(|task| task.status != TaskStatus::Done)
        .filter(|task| window.include_overdue || task.status != TaskStatus::Overdue)
        .filter(|task| due_within(task, now, window.horizon))
        .cloned()
        .collect();

    selected.sort_by_key(|task| (task.due_date, task.id));
    selected
}

pub fn summarize(tasks: &[Task], now: DateTime<Utc>, due_soon_horizon: Duration) -> TaskSummary {
    let mut summary = TaskSummary::default();

    for task in tasks {
        match task.status {
            TaskStatus::Todo => summary.todo += 1,
            TaskStatus::InProgress => summary.in_progress += 1,
            TaskStatus::Review => summary.review += 1,
            TaskStatus::Done => summary.done += 1,
            TaskStatus::Overdue => summary.overdue += 1,
        }

        if task.status != TaskStatus::Done && due_within(task, now, due_soon_horizon) {
            summary.due_soon += 1;
        }
    }

    summary.total = tasks.len();
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Priority;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 18, 9, 0, 0).unwrap()
    }

    fn task(id: u64, status: TaskStatus, due_date: Option<DateTime<Utc>>) -> Task {
        Task {
            id,
            title: format!("task {id}"),
            description: None,
            priority: Priority::Medium,
            status,
            due_date,
            assignee_id: Some(1),
            project_id: 1,
            created_at: now() - Duration::days(7),
        }
    }

    #[test]
    fn oversized_horizon_has_no_upper_bound() {
        let far = task(1, TaskStatus::Todo, Some(now() + Duration::days(365 * 100)));
        let past = task(2, TaskStatus::Todo, Some(now() - Duration::hours(1)));
        let endless = Duration::weeks(1_000_000_000);

        assert!(due_within(&far, now(), endless));
        assert!(!due_within(&past, now(), endless));
        let window = ReminderWindow {
            horizon: endless,
            include_overdue: true,
        };
        assert_eq!(select_reminders(&[far.clone(), past], now(), &window), vec![far]);
    }

    fn window() -> ReminderWindow {
        ReminderWindow::default()
    }

    fn due_soon() -> Duration {
        Duration::hours(DUE_SOON_HORIZON_HOURS)
    }

    #[test]
    fn in_progress_task_past_due_becomes_overdue() {
        let mut late = task(1, TaskStatus::InProgress, Some(now() - Duration::hours(1)));

        assert_eq!(summarize(&[late.clone()], now(), due_soon()).in_progress, 1);

        late.status = classify(&late, now());
        assert_eq!(late.status, TaskStatus::Overdue);

        let summary = summarize(&[late], now(), due_soon());
        assert_eq!(summary.overdue, 1);
        assert_eq!(summary.in_progress, 0);
    }

    #[test]
    fn done_task_past_due_stays_done() {
        let done = task(1, TaskStatus::Done, Some(now() - Duration::hours(1)));
        assert_eq!(classify(&done, now()), TaskStatus::Done);
    }

    #[test]
    fn due_at_exactly_now_is_not_overdue() {
        let edge = task(1, TaskStatus::Todo, Some(now()));
        assert_eq!(classify(&edge, now()), TaskStatus::Todo);
    }

    #[test]
    fn reconcile_clears_stale_overdue() {
        let moved = task(1, TaskStatus::Overdue, Some(now() + Duration::days(2)));
        assert_eq!(reconcile(&moved, now()), TaskStatus::Todo);

        let cleared = task(2, TaskStatus::Overdue, None);
        assert_eq!(reconcile(&cleared, now()), TaskStatus::Todo);

        let still_late = task(3, TaskStatus::Overdue, Some(now() - Duration::minutes(5)));
        assert_eq!(reconcile(&still_late, now()), TaskStatus::Overdue);

        let review = task(4, TaskStatus::Review, Some(now() + Duration::days(2)));
        assert_eq!(reconcile(&review, now()), TaskStatus::Review);
    }

    #[test]
    fn reminder_window_is_half_open() {
        let at_now = task(1, TaskStatus::Todo, Some(now()));
        let at_edge = task(2, TaskStatus::Todo, Some(now() + Duration::hours(24)));
        let past_edge = task(
            3,
            TaskStatus::Todo,
            Some(now() + Duration::hours(24) + Duration::seconds(1)),
        );

        let selected = select_reminders(&[at_now, at_edge, past_edge], now(), &window());
        let ids: Vec<u64> = selected.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![2]);
    }

    #[test]
    fn task_due_in_two_hours_is_reminded_and_due_soon() {
        let upcoming = task(1, TaskStatus::Todo, Some(now() + Duration::hours(2)));
        let tasks = [upcoming];

        assert_eq!(select_reminders(&tasks, now(), &window()).len(), 1);

        let summary = summarize(&tasks, now(), due_soon());
        assert_eq!(summary.todo, 1);
        assert_eq!(summary.due_soon, 1);
        assert_eq!(summary.total, 1);
    }

    #[test]
    fn reminders_skip_done_and_undated_tasks() {
        let tasks = [
            task(1, TaskStatus::Done, Some(now() + Duration::hours(1))),
            task(2, TaskStatus::Review, None),
            task(3, TaskStatus::Review, Some(now() + Duration::hours(1))),
        ];
        let ids: Vec<u64> = select_reminders(&tasks, now(), &window())
            .iter()
            .map(|t| t.id)
            .collect();
        assert_eq!(ids, vec![3]);
    }

    #[test]
    fn overdue_reminders_follow_the_flag() {
        // A task can carry a stale overdue status until the next reconcile.
        let stale = task(1, TaskStatus::Overdue, Some(now() + Duration::hours(3)));
        let tasks = [stale];

        assert_eq!(select_reminders(&tasks, now(), &window()).len(), 1);

        let strict = ReminderWindow {
            include_overdue: false,
            ..window()
        };
        assert!(select_reminders(&tasks, now(), &strict).is_empty());
    }

    #[test]
    fn reminders_are_sorted_soonest_first() {
        let tasks = [
            task(5, TaskStatus::Todo, Some(now() + Duration::hours(20))),
            task(2, TaskStatus::Todo, Some(now() + Duration::hours(3))),
            task(9, TaskStatus::InProgress, Some(now() + Duration::hours(3))),
            task(1, TaskStatus::Review, Some(now() + Duration::hours(12))),
        ];
        let ids: Vec<u64> = select_reminders(&tasks, now(), &window())
            .iter()
            .map(|t| t.id)
            .collect();
        assert_eq!(ids, vec![2, 9, 1, 5]);
    }

    #[test]
    fn empty_task_set_summarizes_to_zero() {
        assert_eq!(summarize(&[], now(), due_soon()), TaskSummary::default());
    }

    #[test]
    fn due_soon_uses_its_own_horizon() {
        let tasks = [
            task(1, TaskStatus::InProgress, Some(now() + Duration::hours(30))),
            task(2, TaskStatus::Done, Some(now() + Duration::hours(30))),
            task(3, TaskStatus::Todo, Some(now() + Duration::hours(49))),
        ];
        let summary = summarize(&tasks, now(), due_soon());
        assert_eq!(summary.due_soon, 1);
        assert_eq!(summary.in_progress, 1);
        assert_eq!(summary.done, 1);
        assert_eq!(summary.todo, 1);
    }

    fn any_status() -> impl Strategy<Value = TaskStatus> {
        prop::sample::select(TaskStatus::ALL.to_vec())
    }

    fn any_task() -> impl Strategy<Value = Task> {
        (
            1u64..1000,
            any_status(),
            prop::option::of(-10_000i64..10_000),
        )
            .prop_map(|(id, status, offset)| {
                task(id, status, offset.map(|minutes| now() + Duration::minutes(minutes)))
            })
    }

    proptest! {
        #[test]
        fn classify_never_touches_done(offset in prop::option::of(-10_000i64..10_000)) {
            let done = task(1, TaskStatus::Done, offset.map(|m| now() + Duration::minutes(m)));
            prop_assert_eq!(classify(&done, now()), TaskStatus::Done);
        }

        #[test]
        fn classify_never_touches_undated(status in any_status()) {
            let undated = task(1, status, None);
            prop_assert_eq!(classify(&undated, now()), status);
        }

        #[test]
        fn classify_marks_past_due_overdue(status in any_status(), minutes in 1i64..10_000) {
            prop_assume!(status != TaskStatus::Done);
            let late = task(1, status, Some(now() - Duration::minutes(minutes)));
            prop_assert_eq!(classify(&late, now()), TaskStatus::Overdue);
        }

        #[test]
        fn classify_is_idempotent(mut subject in any_task()) {
            let once = classify(&subject, now());
            subject.status = once;
            prop_assert_eq!(classify(&subject, now()), once);
        }

        #[test]
        fn summary_buckets_sum_to_total(tasks in prop::collection::vec(any_task(), 0..40)) {
            let summary = summarize(&tasks, now(), due_soon());
            let buckets: usize = TaskStatus::ALL.iter().map(|s| summary.count(*s)).sum();
            prop_assert_eq!(buckets, summary.total);
            prop_assert_eq!(summary.total, tasks.len());
            prop_assert!(summary.due_soon <= summary.total - summary.done);
        }
    }
}
