use chrono::{DateTime, Duration, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

/// How often a job should run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Schedule {
    /// Every `secs` seconds, starting as soon as the scheduler starts.
    Interval { secs: u64 },
    /// Once a day at `hour:min` UTC.
    Daily { hour: u8, min: u8 },
}

impl Schedule {
    pub fn validate(&self) -> anyhow::Result<()> {
        match *self {
            Schedule::Interval { secs } => {
                anyhow::ensure!(secs > 0, "interval schedules need a positive period");
            }
            Schedule::Daily { hour, min } => {
                anyhow::ensure!(
                    hour < 24 && min < 60,
                    "daily schedule {hour:02}:{min:02} is not a time of day"
                );
            }
        }
        Ok(())
    }

    /// When a job on this schedule first runs if the scheduler starts at `start`.
    pub fn first_run(&self, start: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            Schedule::Interval { .. } => start,
            Schedule::Daily { .. } => self.next_after(start),
        }
    }

    /// The next run strictly after `after`.
    pub fn next_after(&self, after: DateTime<Utc>) -> DateTime<Utc> {
        match *self {
            Schedule::Interval { secs } => {
                // Capped so absurd configs cannot overflow the timestamp.
                after + Duration::seconds(secs.min(u64::from(u32::MAX)) as i64)
            }
            Schedule::Daily { hour, min } => {
                let time = NaiveTime::from_hms_opt(u32::from(hour), u32::from(min), 0)
                    .unwrap_or(NaiveTime::MIN);
                let today = after.date_naive().and_time(time).and_utc();
                if today > after {
                    today
                } else {
                    today + Duration::days(1)
                }
            }
        }
    }
}

impl std::fmt::Display for Schedule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Interval { secs } => match *secs {
                secs if secs % 3600 == 0 => write!(f, "every {} hours", secs / 3600),
                secs if secs % 60 == 0 => write!(f, "every {} minutes", secs / 60),
                secs => write!(f, "every {secs} seconds"),
            },
            Self::Daily { hour, min } => write!(f, "daily at {hour:02}:{min:02} UTC"),
        }
    }
}
