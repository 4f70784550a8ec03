//! Cron scheduler
//!
//! Each job runs as its own tokio task that sleeps until the next occurrence
//! and then emits a [`ScheduledPrompt`] on an unbounded channel. The server
//! drains the channel and feeds each prompt through the agent loop as if the
//! user had sent it. Jobs live in memory only.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use cron::Schedule;
use serde::Serialize;
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;

use crate::error::{Result, ToolsError};

/// A synthetic user turn produced when a job fires
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScheduledPrompt {
    pub user_id: String,
    pub job_id: String,
    pub prompt: String,
}

/// A registered job
#[derive(Clone, Debug, Serialize)]
pub struct CronJob {
    pub id: String,
    pub user_id: String,
    pub expression: String,
    pub description: String,
    pub prompt: String,
    pub created_at: DateTime<Utc>,
}

struct JobEntry {
    job: CronJob,
    task: JoinHandle<()>,
}

/// In-memory cron scheduler
pub struct CronScheduler {
    timezone: Tz,
    next_id: AtomicU64,
    jobs: Mutex<BTreeMap<u64, JobEntry>>,
    tx: mpsc::UnboundedSender<ScheduledPrompt>,
}

impl CronScheduler {
    /// Create a scheduler evaluating expressions in `timezone`, together with
    /// the receiving end of its trigger channel
    pub fn new(timezone: Tz) -> (Self, mpsc::UnboundedReceiver<ScheduledPrompt>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let scheduler = Self {
            timezone,
            next_id: AtomicU64::new(1),
            jobs: Mutex::new(BTreeMap::new()),
            tx,
        };
        (scheduler, rx)
    }

    pub const fn timezone(&self) -> Tz {
        self.timezone
    }

    /// Parse a 5-field (minute-first) or 6/7-field (seconds-first) expression
    pub fn parse(expression: &str) -> Result<Schedule> {
        let fields: Vec<&str> = expression.split_whitespace().collect();
        let normalized = match fields.len() {
            5 => {
                let dow = unix_weekdays_to_names(fields[4]);
                format!("0 {} {} {} {} {dow}", fields[0], fields[1], fields[2], fields[3])
            }
            6 | 7 => fields.join(" "),
            n => {
                return Err(ToolsError::InvalidCron {
                    expression: expression.to_string(),
                    reason: format!("expected 5 fields, found {n}"),
                });
            }
        };
        Schedule::from_str(&normalized).map_err(|e| ToolsError::InvalidCron {
            expression: expression.to_string(),
            reason: e.to_string(),
        })
    }

    /// Next time `expression` fires after now
    pub fn next_fire(&self, expression: &str) -> Result<Option<DateTime<Tz>>> {
        let schedule = Self::parse(expression)?;
        Ok(schedule.upcoming(self.timezone).next())
    }

    /// Register a job for `user_id`
    pub async fn add(
        &self,
        user_id: &str,
        expression: &str,
        description: &str,
        prompt: &str,
    ) -> Result<CronJob> {
        let schedule = Self::parse(expression)?;
        let seq = self.next_id.fetch_add(1, Ordering::Relaxed);
        let job = CronJob {
            id: format!("cron_{seq}"),
            user_id: user_id.to_string(),
            expression: expression.trim().to_string(),
            description: description.trim().to_string(),
            prompt: prompt.trim().to_string(),
            created_at: Utc::now(),
        };

        let task = self.spawn_job(&job, schedule);
        self.jobs.lock().await.insert(
            seq,
            JobEntry {
                job: job.clone(),
                task,
            },
        );
        tracing::info!(job_id = %job.id, user_id, expression = %job.expression, "Cron job registered");
        Ok(job)
    }

    /// Jobs owned by `user_id`, oldest first
    pub async fn list(&self, user_id: &str) -> Vec<CronJob> {
        self.jobs
            .lock()
            .await
            .values()
            .filter(|e| e.job.user_id == user_id)
            .map(|e| e.job.clone())
            .collect()
    }

    /// Stop and remove one of the user's jobs
    pub async fn remove(&self, user_id: &str, job_id: &str) -> Option<CronJob> {
        let seq: u64 = job_id.trim().strip_prefix("cron_")?.parse().ok()?;
        let mut jobs = self.jobs.lock().await;
        if jobs.get(&seq).is_none_or(|e| e.job.user_id != user_id) {
            return None;
        }
        let entry = jobs.remove(&seq)?;
        entry.task.abort();
        tracing::info!(job_id, user_id, "Cron job removed");
        Some(entry.job)
    }

    /// Number of active jobs across all users
    pub async fn len(&self) -> usize {
        self.jobs.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.lock().await.is_empty()
    }

    fn spawn_job(&self, job: &CronJob, schedule: Schedule) -> JoinHandle<()> {
        let tx = self.tx.clone();
        let tz = self.timezone;
        let job_id = job.id.clone();
        let user_id = job.user_id.clone();
        let prompt = format!(
            "[Scheduled task] {}\nPlease carry out: {}",
            job.description, job.prompt
        );

        tokio::spawn(async move {
            let mut cursor = Utc::now().with_timezone(&tz);
            loop {
                let Some(next) = schedule.after(&cursor).next() else {
                    tracing::info!(job_id = %job_id, "Cron job has no further occurrences");
                    break;
                };
                let wait = (next.with_timezone(&Utc) - Utc::now())
                    .to_std()
                    .unwrap_or_default();
                tokio::time::sleep(wait).await;
                cursor = next;

                tracing::info!(job_id = %job_id, user_id = %user_id, "Cron job fired");
                let fired = ScheduledPrompt {
                    user_id: user_id.clone(),
                    job_id: job_id.clone(),
                    prompt: prompt.clone(),
                };
                if tx.send(fired).is_err() {
                    tracing::warn!(job_id = %job_id, "Trigger channel closed, stopping job");
                    break;
                }
            }
        })
    }
}

impl Drop for CronScheduler {
    fn drop(&mut self) {
        for entry in self.jobs.get_mut().values() {
            entry.task.abort();
        }
    }
}

const WEEKDAYS: [&str; 7] = ["SUN", "MON", "TUE", "WED", "THU", "FRI", "SAT"];

fn weekday_name(token: &str) -> Option<&'static str> {
    let n: usize = token.parse().ok()?;
    WEEKDAYS.get(n % 7).copied()
}

/// Rewrite numeric weekdays (0 or 7 = Sunday) as names, since the seconds-first
/// grammar numbers Sunday as 1. Steps after `/` are left alone.
fn unix_weekdays_to_names(field: &str) -> String {
    field
        .split(',')
        .map(|part| {
            let (base, step) = match part.split_once('/') {
                Some((base, step)) => (base, Some(step)),
                None => (part, None),
            };
            let base = match base.split_once('-') {
                Some((from, to)) => match (weekday_name(from), weekday_name(to)) {
                    // `5-7` ends on Sunday, which sorts first in the named form
                    (Some(a), Some(_)) if to == "7" && step.is_none() && from != "0" => {
                        format!("{a}-SAT,SUN")
                    }
                    (Some(a), Some(_)) if to == "7" => format!("{a}-SAT"),
                    (Some(a), Some(b)) => format!("{a}-{b}"),
                    _ => base.to_string(),
                },
                None => weekday_name(base).map_or_else(|| base.to_string(), str::to_string),
            };
            match step {
                Some(step) => format!("{base}/{step}"),
                None => base,
            }
        })
        .collect::<Vec<_>>()
        .join(",")
}
