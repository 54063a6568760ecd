// SPDX-FileCopyrightText: 2026 Skiff Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `skiff cron` subcommands.

use std::fmt::Write as _;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use clap::{ArgGroup, Args, Subcommand};
use skiff_config::SkiffConfig;
use skiff_core::{SkiffError, StorageAdapter};
use skiff_cron::{CronJob, CronPayload, CronSchedule, CronService, JobSpec};

#[derive(Subcommand, Debug, Clone)]
pub enum CronCommand {
    /// List scheduled jobs.
    List {
        /// Include disabled jobs.
        #[arg(long)]
        all: bool,
    },
    /// Schedule a new job.
    Add(AddArgs),
    /// Delete a job.
    Remove { id: String },
    /// Enable a job and recompute its next run.
    Enable { id: String },
    /// Disable a job without deleting it.
    Disable { id: String },
    /// Mark a job due now; a running `skiff` instance executes it on its
    /// next wake.
    Run { id: String },
}

#[derive(Args, Debug, Clone)]
#[command(group(ArgGroup::new("when").required(true).args(["every", "cron", "at"])))]
pub struct AddArgs {
    /// Job name.
    #[arg(long)]
    pub name: String,
    /// Message handed to the agent when the job fires.
    #[arg(long, short)]
    pub message: String,
    /// Run every N seconds.
    #[arg(long)]
    pub every: Option<u64>,
    /// Cron expression, e.g. "0 9 * * *".
    #[arg(long)]
    pub cron: Option<String>,
    /// IANA timezone for --cron, e.g. Europe/Moscow.
    #[arg(long, requires = "cron")]
    pub tz: Option<String>,
    /// Run once at an RFC 3339 time.
    #[arg(long)]
    pub at: Option<String>,
    /// Deliver the answer to --channel/--to.
    #[arg(long, requires_all = ["channel", "to"])]
    pub deliver: bool,
    #[arg(long)]
    pub channel: Option<String>,
    /// Chat id to deliver to.
    #[arg(long)]
    pub to: Option<String>,
    /// Keep a one-shot --at job (disabled) after it runs.
    #[arg(long)]
    pub keep: bool,
}

impl AddArgs {
    fn into_spec(self) -> Result<JobSpec, SkiffError> {
        let schedule = match (self.every, self.cron, self.at) {
            (Some(every_secs), None, None) => CronSchedule::Every { every_secs },
            (None, Some(expr), None) => CronSchedule::Cron { expr, tz: self.tz },
            (None, None, Some(at)) => {
                let at = DateTime::parse_from_rfc3339(&at).map_err(|e| {
                    SkiffError::Scheduling(format!("--at must be RFC 3339: {e}"))
                })?;
                CronSchedule::At {
                    at: at.with_timezone(&Utc),
                }
            }
            _ => {
                return Err(SkiffError::Scheduling(
                    "give exactly one of --every, --cron or --at".into(),
                ));
            }
        };

        let payload = CronPayload {
            message: self.message,
            deliver: self.deliver,
            channel: self.channel,
            to: self.to,
        };
        let mut spec = JobSpec::new(self.name, schedule, payload);
        if self.keep {
            spec = spec.delete_after_run(false);
        }
        Ok(spec)
    }
}

fn format_time(at: Option<DateTime<Utc>>) -> String {
    at.map(|at| at.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| "-".to_string())
}

fn format_job(out: &mut String, job: &CronJob) {
    let state = if job.enabled { "enabled" } else { "disabled" };
    let _ = writeln!(
        out,
        "{:<10} {:<20} {:<9} next: {:<24} {}",
        job.id,
        job.name,
        state,
        format_time(job.state.next_run_at),
        job.schedule.describe()
    );
    if let Some(status) = job.state.last_status {
        let _ = write!(out, "{:<10} last: {} ({status})", "", format_time(job.state.last_run_at));
        if let Some(err) = &job.state.last_error {
            let _ = write!(out, ": {err}");
        }
        out.push('\n');
    }
}

impl CronCommand {
    /// Runs the command and returns what to print.
    pub async fn run(
        self,
        config: &SkiffConfig,
        storage: Arc<dyn StorageAdapter>,
    ) -> Result<String, SkiffError> {
        let service = CronService::new(storage, &config.cron);
        match self {
            Self::List { all } => {
                let jobs = service.list_jobs(all).await?;
                if jobs.is_empty() {
                    return Ok("No scheduled jobs.\n".to_string());
                }
                let mut out = String::new();
                for job in &jobs {
                    format_job(&mut out, job);
                }
                Ok(out)
            }
            Self::Add(args) => {
                let job = service.add_job(args.into_spec()?).await?;
                Ok(format!(
                    "Added job {} ({}), next run {}\n",
                    job.id,
                    job.schedule.describe(),
                    format_time(job.state.next_run_at)
                ))
            }
            Self::Remove { id } => {
                if service.remove_job(&id).await? {
                    Ok(format!("Removed job {id}\n"))
                } else {
                    Err(not_found(&id))
                }
            }
            Self::Enable { id } => toggle(&service, &id, true).await,
            Self::Disable { id } => toggle(&service, &id, false).await,
            Self::Run { id } => {
                if service.trigger(&id).await? {
                    Ok(format!(
                        "Job {id} is due now; a running skiff instance will pick it up\n"
                    ))
                } else {
                    Err(not_found(&id))
                }
            }
        }
    }
}

async fn toggle(service: &CronService, id: &str, enabled: bool) -> Result<String, SkiffError> {
    let job = service
        .enable_job(id, enabled)
        .await?
        .ok_or_else(|| not_found(id))?;
    let verb = if enabled { "Enabled" } else { "Disabled" };
    Ok(format!(
        "{verb} job {id}, next run {}\n",
        format_time(job.state.next_run_at)
    ))
}

fn not_found(id: &str) -> SkiffError {
    SkiffError::Validation(format!("no cron job with id '{id}'"))
}
