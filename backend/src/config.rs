use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use shared::automation::{ReminderWindow, DUE_SOON_HORIZON_HOURS, REMINDER_HORIZON_HOURS};

use crate::scheduler::Schedule;

/// One year.
const MAX_HORIZON_HOURS: i64 = 24 * 365;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub automation: AutomationConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the HTTP listener binds to
    pub bind_addr: String,

    /// Directory of a pre-built front end served for unmatched paths
    pub static_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:3000".to_string(),
            static_dir: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Memory,
    Redis,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,

    /// Only read when `backend = "redis"`; `REDIS_URL` overrides it
    pub redis_url: String,

    /// Create the default admin and sample accounts on startup
    pub seed_sample_data: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            redis_url: "redis://127.0.0.1:6379".to_string(),
            seed_sample_data: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AutomationConfig {
    /// How often the scheduler wakes up to look for due jobs
    pub tick_secs: u64,

    /// Upper bound on a single job run
    pub job_timeout_secs: u64,

    pub overdue_sweep: Schedule,
    pub reminders: Schedule,
    pub summaries: Schedule,

    pub reminder_horizon_hours: i64,
    pub due_soon_horizon_hours: i64,

    /// Keep reminding about tasks whose status is already `overdue`
    pub reminders_include_overdue: bool,
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            tick_secs: 60,
            job_timeout_secs: 300,
            overdue_sweep: Schedule::Interval { secs: 3600 },
            reminders: Schedule::Daily { hour: 9, min: 0 },
            summaries: Schedule::Daily { hour: 8, min: 0 },
            reminder_horizon_hours: REMINDER_HORIZON_HOURS,
            due_soon_horizon_hours: DUE_SOON_HORIZON_HOURS,
            reminders_include_overdue: true,
        }
    }
}

impl AutomationConfig {
    pub fn reminder_window(&self) -> ReminderWindow {
        ReminderWindow {
            horizon: Duration::hours(self.reminder_horizon_hours),
            include_overdue: self.reminders_include_overdue,
        }
    }

    pub fn due_soon_horizon(&self) -> Duration {
        Duration::hours(self.due_soon_horizon_hours)
    }
}

impl Config {
    /// Reads the TOML file at `path`, falling back to defaults when no path is
    /// given or the file does not exist, then applies environment overrides.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut config = match path {
            Some(path) => read_file_content_if_exist(path)?
                .map(|content| {
                    toml::from_str::<Config>(&content)
                        .with_context(|| format!("invalid config file '{}'", path.display()))
                })
                .transpose()?
                .unwrap_or_default(),
            None => Config::default(),
        };

        if let Ok(url) = std::env::var("REDIS_URL") {
            config.storage.redis_url = url;
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        let automation = &self.automation;
        anyhow::ensure!(automation.tick_secs > 0, "automation.tick_secs must be positive");
        anyhow::ensure!(
            automation.job_timeout_secs > 0,
            "automation.job_timeout_secs must be positive"
        );
        for (name, hours) in [
            ("reminder_horizon_hours", automation.reminder_horizon_hours),
            ("due_soon_horizon_hours", automation.due_soon_horizon_hours),
        ] {
            anyhow::ensure!(
                (1..=MAX_HORIZON_HOURS).contains(&hours),
                "automation.{name} must be between 1 and {MAX_HORIZON_HOURS}"
            );
        }
        for schedule in [&automation.overdue_sweep, &automation.reminders, &automation.summaries] {
            schedule.validate()?;
        }
        Ok(())
    }
}

fn read_file_content_if_exist(path: &Path) -> anyhow::Result<Option<String>> {
    if !path.exists() {
        return Ok(None);
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file '{}'", path.display()))?;
    Ok(Some(content))
}
