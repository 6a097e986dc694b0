//! Scheduler for cron-based background jobs
//!
//! Manages scheduled jobs with support for:
//! - Cron expression parsing
//! - Timezone-aware scheduling
//! - Sleep/wake detection via time-jump polling
//! - Missed job handling (runs if within grace period)

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use cron::Schedule;
use tokio::sync::mpsc;

use crate::config::ScheduleEntry;
use crate::error::AppError;
use crate::state::AppState;

/// Grace period for missed jobs (2 hours)
const MISSED_JOB_GRACE_PERIOD_SECS: i64 = 7200;

/// Extended grace period for weekly and monthly jobs (24 hours) — catches
/// sleep/wake gaps spanning a boundary night
const MISSED_LONG_JOB_GRACE_PERIOD_SECS: i64 = 86400;

/// Time jump threshold to detect sleep/wake (5 minutes)
const TIME_JUMP_THRESHOLD_SECS: i64 = 300;

/// Poll interval for scheduler loop (1 minute)
const POLL_INTERVAL_SECS: u64 = 60;

/// The five background jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobId {
    EndOfDay,
    MorningCheck,
    MiddayNudge,
    EndOfWeek,
    EndOfMonth,
}

impl JobId {
    pub const ALL: [JobId; 5] = [
        JobId::EndOfDay,
        JobId::MorningCheck,
        JobId::MiddayNudge,
        JobId::EndOfWeek,
        JobId::EndOfMonth,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            JobId::EndOfDay => "end_of_day",
            JobId::MorningCheck => "morning_check",
            JobId::MiddayNudge => "midday_nudge",
            JobId::EndOfWeek => "end_of_week",
            JobId::EndOfMonth => "end_of_month",
        }
    }
}

/// How a job run was initiated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Scheduled,
    Missed,
}

/// Message sent to trigger job execution
#[derive(Debug, Clone)]
pub struct SchedulerMessage {
    pub job: JobId,
    pub trigger: Trigger,
}

/// Scheduler for managing job execution times
pub struct Scheduler {
    state: Arc<AppState>,
    sender: mpsc::Sender<SchedulerMessage>,
}

impl Scheduler {
    pub fn new(state: Arc<AppState>, sender: mpsc::Sender<SchedulerMessage>) -> Self {
        Self { state, sender }
    }

    /// Start the scheduler loop
    ///
    /// This runs indefinitely, checking for due jobs every minute.
    /// It also handles sleep/wake detection.
    pub async fn run(&self) {
        let mut last_check = Utc::now();

        loop {
            tokio::time::sleep(Duration::from_secs(POLL_INTERVAL_SECS)).await;

            let now = Utc::now();

            // Detect sleep: time jumped more than 5 minutes
            let time_jump = (now - last_check).num_seconds();
            if time_jump > TIME_JUMP_THRESHOLD_SECS {
                log::info!(
                    "Detected system wake (time jumped {} seconds), checking for missed jobs",
                    time_jump
                );
                self.check_missed_jobs(now).await;
            }

            // Check and run due jobs
            self.check_and_run_due_jobs(now).await;

            last_check = now;
        }
    }

    fn schedule_for(&self, job: JobId) -> ScheduleEntry {
        let config = self.state.config_snapshot();
        match job {
            JobId::EndOfDay => config.schedules.end_of_day,
            JobId::MorningCheck => config.schedules.morning_check,
            JobId::MiddayNudge => config.schedules.midday_nudge,
            JobId::EndOfWeek => config.schedules.end_of_week,
            JobId::EndOfMonth => config.schedules.end_of_month,
        }
    }

    /// Check for jobs that should run now
    async fn check_and_run_due_jobs(&self, now: DateTime<Utc>) {
        for job in JobId::ALL {
            let entry = self.schedule_for(job);
            if !entry.enabled {
                continue;
            }
            match self.should_run_now(&entry, job, now) {
                Ok(true) => {
                    self.state.set_last_scheduled_run(job, now);
                    self.trigger_job(job, Trigger::Scheduled).await;
                }
                Ok(false) => {}
                Err(e) => log::warn!("Bad schedule for {}: {}", job.name(), e),
            }
        }
    }

    /// Check if a job should run at the given time
    fn should_run_now(
        &self,
        entry: &ScheduleEntry,
        job: JobId,
        now: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let schedule = parse_cron(&entry.cron)?;
        let tz: Tz = entry
            .timezone
            .parse()
            .map_err(|_| AppError::Configuration(format!("Invalid timezone: {}", entry.timezone)))?;

        // Convert now to the configured timezone
        let now_local = now.with_timezone(&tz);

        // Get the last scheduled run time
        let last_run = self.state.get_last_scheduled_run(job);

        // Find the most recent scheduled time that's <= now
        let mut scheduled_times = schedule.after(&(now_local - chrono::Duration::minutes(2)));

        if let Some(next_time) = scheduled_times.next() {
            // Check if this minute matches
            let next_utc = next_time.with_timezone(&Utc);
            let diff = (now - next_utc).num_seconds().abs();

            // Within 2 minutes of scheduled time (wider window for sleep/wake)
            if diff < 120 {
                // Check if we already ran this scheduled time
                if let Some(last) = last_run {
                    if (last - next_utc).num_seconds().abs() < 60 {
                        return Ok(false); // Already ran
                    }
                }
                return Ok(true);
            }
        }

        Ok(false)
    }

    /// Check for jobs that were missed during sleep
    async fn check_missed_jobs(&self, now: DateTime<Utc>) {
        for job in JobId::ALL {
            let entry = self.schedule_for(job);
            if !entry.enabled {
                continue;
            }
            match self.find_missed_job(&entry, job, now) {
                Ok(Some(_)) => {
                    log::info!("Found missed '{}' job, running now", job.name());
                    self.state.set_last_scheduled_run(job, now);
                    self.trigger_job(job, Trigger::Missed).await;
                }
                Ok(None) => {}
                Err(e) => log::warn!("Bad schedule for {}: {}", job.name(), e),
            }
        }
    }

    /// Find a missed job within the grace period.
    /// Weekly and monthly jobs use an extended 24-hour grace period.
    fn find_missed_job(
        &self,
        entry: &ScheduleEntry,
        job: JobId,
        now: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>, AppError> {
        let schedule = parse_cron(&entry.cron)?;
        let tz: Tz = entry
            .timezone
            .parse()
            .map_err(|_| AppError::Configuration(format!("Invalid timezone: {}", entry.timezone)))?;

        let now_local = now.with_timezone(&tz);
        let grace_secs = match job {
            JobId::EndOfWeek | JobId::EndOfMonth => MISSED_LONG_JOB_GRACE_PERIOD_SECS,
            _ => MISSED_JOB_GRACE_PERIOD_SECS,
        };
        let grace_period = chrono::Duration::seconds(grace_secs);
        let grace_start = now_local - grace_period;

        // Get last run time
        let last_run = self.state.get_last_scheduled_run(job);

        // Look for scheduled times in the grace period
        let iter = schedule.after(&grace_start);

        for scheduled in iter {
            let scheduled_utc = scheduled.with_timezone(&Utc);

            // Stop if we've passed now
            if scheduled_utc > now {
                break;
            }

            // Check if this was missed
            if let Some(last) = last_run {
                if last >= scheduled_utc {
                    continue; // Already ran
                }
            }

            // Found a missed job
            return Ok(Some(scheduled_utc));
        }

        Ok(None)
    }

    /// Trigger a job execution
    async fn trigger_job(&self, job: JobId, trigger: Trigger) {
        if self
            .sender
            .send(SchedulerMessage { job, trigger })
            .await
            .is_err()
        {
            log::error!("Failed to send scheduler message for {:?}", job);
        }
    }
}

/// Parse a cron expression
pub fn parse_cron(expr: &str) -> Result<Schedule, AppError> {
    // The cron crate expects 6 fields (with seconds), but we use 5-field format
    // Add "0" for seconds at the start
    let full_expr = format!("0 {}", expr);

    full_expr.parse::<Schedule>().map_err(|e| {
        AppError::Configuration(format!("Invalid cron expression '{}': {}", expr, e))
    })
}
