//! Background scheduler for the deadline automation.
//!
//! The scheduler is an owned value: `main` builds it, calls [`Scheduler::start`]
//! and keeps the returned handle to stop it on shutdown. Jobs run one after
//! another inside a single tokio task, so two runs never overlap.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::automation::{self, JobError, JobKind, JobReport};
use crate::config::AutomationConfig;
use crate::notify::Notifier;
use crate::store::SharedStore;

mod schedule;

pub use schedule::Schedule;

#[derive(Debug, Clone)]
struct ScheduledJob {
    kind: JobKind,
    schedule: Schedule,
    next_run: DateTime<Utc>,
}

pub struct Scheduler {
    store: SharedStore,
    notifier: Arc<dyn Notifier>,
    config: AutomationConfig,
    jobs: Vec<ScheduledJob>,
}

impl Scheduler {
    pub fn new(store: SharedStore, notifier: Arc<dyn Notifier>, config: AutomationConfig) -> Self {
        Self::starting_at(store, notifier, config, Utc::now())
    }

    /// Builds a scheduler whose first runs are computed from `start`.
    pub fn starting_at(
        store: SharedStore,
        notifier: Arc<dyn Notifier>,
        config: AutomationConfig,
        start: DateTime<Utc>,
    ) -> Self {
        let jobs = [
            (JobKind::OverdueSweep, config.overdue_sweep),
            (JobKind::Reminders, config.reminders),
            (JobKind::Summaries, config.summaries),
        ]
        .into_iter()
        .map(|(kind, schedule)| ScheduledJob {
            kind,
            schedule,
            next_run: schedule.first_run(start),
        })
        .collect();

        Self {
            store,
            notifier,
            config,
            jobs,
        }
    }

    pub fn next_run(&self, kind: JobKind) -> Option<DateTime<Utc>> {
        self.jobs
            .iter()
            .find(|job| job.kind == kind)
            .map(|job| job.next_run)
    }

    /// Runs every job that is due at `now` and reschedules it.
    pub async fn tick(&mut self, now: DateTime<Utc>) -> Vec<Result<JobReport, JobError>> {
        let mut results = Vec::new();

        for index in 0..self.jobs.len() {
            let job = self.jobs[index].clone();
            if job.next_run > now {
                continue;
            }

            debug!("running {} ({})", job.kind, job.schedule);
            let result = self.run_job(job.kind, now).await;
            if let Err(err) = &result {
                warn!("scheduled job failed: {err}");
            }
            results.push(result);

            self.jobs[index].next_run = job.schedule.next_after(now);
        }

        results
    }

    async fn run_job(&self, kind: JobKind, now: DateTime<Utc>) -> Result<JobReport, JobError> {
        let store = self.store.as_ref();
        let notifier = self.notifier.as_ref();
        let secs = self.config.job_timeout_secs;

        let run = async {
            match kind {
                JobKind::OverdueSweep => automation::sweep_overdue(store, now)
                    .await
                    .map(|sweep| sweep.report),
                JobKind::Reminders => {
                    automation::dispatch_reminders(store, notifier, &self.config, now).await
                }
                JobKind::Summaries => {
                    automation::dispatch_summaries(store, notifier, &self.config, now).await
                }
            }
        };

        match tokio::time::timeout(std::time::Duration::from_secs(secs), run).await {
            Ok(result) => result,
            Err(_) => Err(JobError::TimedOut { job: kind, secs }),
        }
    }

    /// Spawns the scheduler loop.
    pub fn start(mut self) -> SchedulerHandle {
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

        let join = tokio::spawn(async move {
            for job in &self.jobs {
                info!("scheduled {} {}, first run at {}", job.kind, job.schedule, job.next_run);
            }

            let mut interval =
                tokio::time::interval(std::time::Duration::from_secs(self.config.tick_secs));
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = interval.tick() => {
                        self.tick(Utc::now()).await;
                    }
                }
            }
            info!("scheduler stopped");
        });

        SchedulerHandle {
            stop_tx: Some(stop_tx),
            join,
        }
    }
}

pub struct SchedulerHandle {
    stop_tx: Option<oneshot::Sender<()>>,
    join: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Asks the loop to stop and waits for the current tick to finish.
    pub async fn stop(mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Err(err) = self.join.await {
            error!("scheduler task ended abnormally: {err}");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }
}
