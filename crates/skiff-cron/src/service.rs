// SPDX-FileCopyrightText: 2026 Skiff Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The cron service: job admission plus the timer loop that runs due jobs.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use skiff_config::model::CronConfig;
use skiff_core::{SkiffError, StorageAdapter};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::schedule::{next_run, validate};
use crate::types::{CronJob, CronJobState, CronSchedule, JobSpec, RunStatus};

/// Runs a job's payload when it comes due.
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// Returns the agent's answer, if any. An error is recorded on the job
    /// as `last_status = error`; it never stops the timer.
    async fn on_job(&self, job: &CronJob) -> Result<Option<String>, SkiffError>;
}

/// Snapshot of the scheduler for status displays.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronStatus {
    /// Whether a timer loop is currently running in this process.
    pub running: bool,
    pub jobs: usize,
    pub enabled_jobs: usize,
    pub next_wake_at: Option<DateTime<Utc>>,
}

/// Source of the current time for due checks and bookkeeping.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

pub struct CronService {
    storage: Arc<dyn StorageAdapter>,
    clock: Clock,
    poll_interval: Duration,
    wake: Notify,
    running: AtomicBool,
}

impl CronService {
    pub fn new(storage: Arc<dyn StorageAdapter>, config: &CronConfig) -> Self {
        Self {
            storage,
            clock: Arc::new(Utc::now),
            poll_interval: Duration::from_secs(config.poll_when_empty_secs.max(1)),
            wake: Notify::new(),
            running: AtomicBool::new(false),
        }
    }

    /// Overrides the longest sleep between store reloads.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Replaces the wall clock.
    pub fn with_clock(mut self, clock: impl Fn() -> DateTime<Utc> + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    async fn load_jobs(&self) -> Result<Vec<CronJob>, SkiffError> {
        let documents = self.storage.list_cron_documents().await?;
        let mut jobs = Vec::with_capacity(documents.len());
        for (id, document) in documents {
            match CronJob::from_document(&document) {
                Ok(job) => jobs.push(job),
                Err(e) => warn!(job_id = %id, error = %e, "skipping unreadable cron job"),
            }
        }
        Ok(jobs)
    }

    async fn save(&self, job: &CronJob) -> Result<bool, SkiffError> {
        self.storage
            .update_cron_document(&job.id, &job.to_document()?)
            .await
    }

    /// Validates and stores a new job, then wakes the timer.
    pub async fn add_job(&self, spec: JobSpec) -> Result<CronJob, SkiffError> {
        let now = self.now();
        validate(&spec.schedule, now)?;
        let next_run_at = next_run(&spec.schedule, now)?;
        let delete_after_run = spec.resolved_delete_after_run();

        let id = uuid::Uuid::new_v4().simple().to_string()[..8].to_string();
        let job = CronJob {
            id,
            name: spec.name,
            enabled: true,
            schedule: spec.schedule,
            payload: spec.payload,
            state: CronJobState {
                next_run_at,
                ..Default::default()
            },
            delete_after_run,
            created_at: now,
            updated_at: now,
        };
        self.storage
            .upsert_cron_document(&job.id, &job.to_document()?)
            .await?;
        info!(
            job_id = %job.id,
            name = %job.name,
            schedule = %job.schedule.describe(),
            "cron job added"
        );
        self.wake.notify_one();
        Ok(job)
    }

    /// Returns false if no job had that id.
    pub async fn remove_job(&self, id: &str) -> Result<bool, SkiffError> {
        let removed = self.storage.delete_cron_document(id).await?;
        if removed {
            info!(job_id = %id, "cron job removed");
            self.wake.notify_one();
        }
        Ok(removed)
    }

    /// Enables or disables a job. Enabling recomputes its next run.
    pub async fn enable_job(&self, id: &str, enabled: bool) -> Result<Option<CronJob>, SkiffError> {
        let Some(mut job) = self.get_job(id).await? else {
            return Ok(None);
        };
        let now = self.now();
        job.enabled = enabled;
        job.state.next_run_at = if enabled {
            next_run(&job.schedule, now)?
        } else {
            None
        };
        job.updated_at = now;
        if !self.save(&job).await? {
            return Ok(None);
        }
        info!(job_id = %id, enabled, "cron job toggled");
        self.wake.notify_one();
        Ok(Some(job))
    }

    pub async fn get_job(&self, id: &str) -> Result<Option<CronJob>, SkiffError> {
        Ok(self.load_jobs().await?.into_iter().find(|job| job.id == id))
    }

    /// Jobs ordered by next run (unscheduled last), then name.
    pub async fn list_jobs(&self, include_disabled: bool) -> Result<Vec<CronJob>, SkiffError> {
        let mut jobs: Vec<CronJob> = self
            .load_jobs()
            .await?
            .into_iter()
            .filter(|job| include_disabled || job.enabled)
            .collect();
        jobs.sort_by(|a, b| {
            let key = |job: &CronJob| (job.state.next_run_at.is_none(), job.state.next_run_at);
            key(a).cmp(&key(b)).then_with(|| a.name.cmp(&b.name))
        });
        Ok(jobs)
    }

    /// Runs a job now, outside its schedule. Disabled jobs only run with
    /// `force`. Returns false if the job is missing or was not run.
    pub async fn run_job(
        &self,
        id: &str,
        force: bool,
        handler: &dyn JobHandler,
    ) -> Result<bool, SkiffError> {
        let Some(job) = self.get_job(id).await? else {
            return Ok(false);
        };
        if !job.enabled && !force {
            return Ok(false);
        }
        self.execute(job, handler).await?;
        Ok(true)
    }

    /// Marks a job due immediately so whichever process runs the timer
    /// picks it up on its next wake.
    pub async fn trigger(&self, id: &str) -> Result<bool, SkiffError> {
        let Some(mut job) = self.get_job(id).await? else {
            return Ok(false);
        };
        let now = self.now();
        job.state.next_run_at = Some(now);
        job.updated_at = now;
        let saved = self.save(&job).await?;
        if saved {
            self.wake.notify_one();
        }
        Ok(saved)
    }

    pub async fn status(&self) -> Result<CronStatus, SkiffError> {
        let jobs = self.load_jobs().await?;
        let enabled: Vec<&CronJob> = jobs.iter().filter(|job| job.enabled).collect();
        Ok(CronStatus {
            running: self.running.load(Ordering::SeqCst),
            jobs: jobs.len(),
            enabled_jobs: enabled.len(),
            next_wake_at: enabled.iter().filter_map(|job| job.state.next_run_at).min(),
        })
    }

    /// Timer loop. Reloads the store on every wake, runs what is due, then
    /// sleeps until the earliest next run or the poll interval, whichever
    /// comes first. Returns once `cancel` fires.
    pub async fn start(self: Arc<Self>, handler: Arc<dyn JobHandler>, cancel: CancellationToken) {
        self.running.store(true, Ordering::SeqCst);
        info!(poll_secs = self.poll_interval.as_secs_f64(), "cron timer started");

        while !cancel.is_cancelled() {
            let now = self.now();
            let (delay, ran_any) = match self.load_jobs().await {
                Ok(jobs) => {
                    let (due, pending): (Vec<_>, Vec<_>) =
                        jobs.into_iter().partition(|job| job.is_due(now));
                    let ran_any = !due.is_empty();
                    let mut failed = false;
                    for job in due {
                        if cancel.is_cancelled() {
                            break;
                        }
                        if let Err(e) = self.execute(job, handler.as_ref()).await {
                            warn!(error = %e, "failed to record cron run");
                            failed = true;
                        }
                    }
                    let delay = if failed {
                        self.poll_interval
                    } else {
                        self.delay_until_next(&pending, now)
                    };
                    (delay, ran_any && !failed)
                }
                Err(e) => {
                    warn!(error = %e, "failed to reload cron jobs");
                    (self.poll_interval, false)
                }
            };

            // Running a batch takes time; look again before sleeping.
            if ran_any {
                continue;
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = self.wake.notified() => debug!("cron timer woken by admission"),
                _ = tokio::time::sleep(delay) => {}
            }
        }

        self.running.store(false, Ordering::SeqCst);
        info!("cron timer stopped");
    }

    fn delay_until_next(&self, jobs: &[CronJob], now: DateTime<Utc>) -> Duration {
        jobs.iter()
            .filter(|job| job.enabled)
            .filter_map(|job| job.state.next_run_at)
            .min()
            .map(|at| (at - now).to_std().unwrap_or_default())
            .map_or(self.poll_interval, |d| d.min(self.poll_interval))
    }

    async fn execute(&self, mut job: CronJob, handler: &dyn JobHandler) -> Result<(), SkiffError> {
        let started = self.now();
        info!(job_id = %job.id, name = %job.name, "running cron job");

        match handler.on_job(&job).await {
            Ok(_) => {
                job.state.last_status = Some(RunStatus::Ok);
                job.state.last_error = None;
            }
            Err(e) => {
                warn!(job_id = %job.id, error = %e, "cron job failed");
                job.state.last_status = Some(RunStatus::Error);
                job.state.last_error = Some(e.to_string());
            }
        }
        let finished = self.now();
        job.state.last_run_at = Some(started);
        job.updated_at = finished;

        if job.delete_after_run {
            self.storage.delete_cron_document(&job.id).await?;
            debug!(job_id = %job.id, "one-shot cron job deleted after run");
            return Ok(());
        }

        if let CronSchedule::At { .. } = job.schedule {
            job.enabled = false;
            job.state.next_run_at = None;
        } else {
            job.state.next_run_at = match next_run(&job.schedule, finished) {
                Ok(next) => next,
                Err(e) => {
                    warn!(job_id = %job.id, error = %e, "cron job has no next run");
                    None
                }
            };
        }

        if !self.save(&job).await? {
            debug!(job_id = %job.id, "cron job removed while running, not re-saved");
        }
        Ok(())
    }
}
