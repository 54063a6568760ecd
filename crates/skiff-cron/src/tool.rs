// SPDX-FileCopyrightText: 2026 Skiff Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `cron`: lets the model schedule reminders and recurring tasks.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use skiff_core::SkiffError;
use skiff_tools::{SideEffect, Tool, ToolContext, ToolOutput};

use crate::service::CronService;
use crate::types::{CronPayload, CronSchedule, JobSpec};

pub struct CronTool {
    service: Arc<CronService>,
}

impl CronTool {
    pub fn new(service: Arc<CronService>) -> Self {
        Self { service }
    }

    async fn add(&self, input: &Value, ctx: &ToolContext) -> Result<ToolOutput, SkiffError> {
        let Some(message) = input.get("message").and_then(Value::as_str) else {
            return Ok(ToolOutput::error("`message` is required for add"));
        };
        let schedule = match schedule_from(input) {
            Ok(schedule) => schedule,
            Err(reason) => return Ok(ToolOutput::error(reason)),
        };
        let name = input
            .get("name")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| message.chars().take(30).collect());

        let mut payload = CronPayload::new(message).deliver_to(&ctx.channel, &ctx.chat_id);
        payload.deliver = input.get("deliver").and_then(Value::as_bool).unwrap_or(true);

        match self
            .service
            .add_job(JobSpec::new(name, schedule, payload))
            .await
        {
            Ok(job) => Ok(ToolOutput::ok(format!(
                "Scheduled job '{}' (id: {}), {}",
                job.name,
                job.id,
                job.schedule.describe()
            ))),
            Err(SkiffError::Scheduling(reason)) => Ok(ToolOutput::error(reason)),
            Err(e) => Err(e),
        }
    }

    async fn list(&self) -> Result<ToolOutput, SkiffError> {
        let jobs = self.service.list_jobs(false).await?;
        if jobs.is_empty() {
            return Ok(ToolOutput::ok("No scheduled jobs."));
        }
        let lines: Vec<String> = jobs
            .iter()
            .map(|job| {
                format!(
                    "- {} (id: {}, {})",
                    job.name,
                    job.id,
                    job.schedule.describe()
                )
            })
            .collect();
        Ok(ToolOutput::ok(format!("Scheduled jobs:\n{}", lines.join("\n"))))
    }

    async fn remove(&self, input: &Value) -> Result<ToolOutput, SkiffError> {
        let Some(id) = input.get("job_id").and_then(Value::as_str) else {
            return Ok(ToolOutput::error("`job_id` is required for remove"));
        };
        if self.service.remove_job(id).await? {
            Ok(ToolOutput::ok(format!("Removed job {id}")))
        } else {
            Ok(ToolOutput::error(format!("Job {id} not found")))
        }
    }
}

fn schedule_from(input: &Value) -> Result<CronSchedule, String> {
    let every = input.get("every_seconds").and_then(Value::as_u64);
    let expr = input.get("cron_expr").and_then(Value::as_str);
    let at = input.get("at").and_then(Value::as_str);
    let tz = input.get("tz").and_then(Value::as_str);

    if tz.is_some() && expr.is_none() {
        return Err("`tz` can only be used with `cron_expr`".into());
    }
    match (every, expr, at) {
        (Some(every_secs), None, None) => Ok(CronSchedule::Every { every_secs }),
        (None, Some(expr), None) => Ok(CronSchedule::Cron {
            expr: expr.to_string(),
            tz: tz.map(str::to_string),
        }),
        (None, None, Some(at)) => DateTime::parse_from_rfc3339(at)
            .map(|at| CronSchedule::At {
                at: at.with_timezone(&Utc),
            })
            .map_err(|e| format!("`at` must be an RFC 3339 timestamp: {e}")),
        _ => Err("give exactly one of `every_seconds`, `cron_expr` or `at`".into()),
    }
}

#[async_trait]
impl Tool for CronTool {
    fn name(&self) -> &str {
        "cron"
    }

    fn description(&self) -> &str {
        "Schedule reminders and recurring tasks. Actions: add, list, remove. \
         For add, give `message` and one of `every_seconds`, `cron_expr` (with optional \
         IANA `tz`) or `at` (RFC 3339)."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "action": {
                    "type": "string",
                    "enum": ["add", "list", "remove"],
                    "description": "Action to perform"
                },
                "message": { "type": "string", "description": "Message the job sends to the agent" },
                "name": { "type": "string", "description": "Short job name (optional)" },
                "every_seconds": { "type": "integer", "minimum": 1, "description": "Interval in seconds" },
                "cron_expr": { "type": "string", "description": "Cron expression like '0 9 * * *'" },
                "tz": { "type": "string", "description": "IANA timezone for cron_expr, e.g. 'Europe/Moscow'" },
                "at": { "type": "string", "description": "One-shot time, RFC 3339" },
                "deliver": { "type": "boolean", "description": "Send the answer to this chat (default true)" },
                "job_id": { "type": "string", "description": "Job id (for remove)" }
            },
            "required": ["action"]
        })
    }

    fn side_effect(&self) -> SideEffect {
        SideEffect::Scheduling
    }

    async fn invoke(&self, input: Value, ctx: &ToolContext) -> Result<ToolOutput, SkiffError> {
        match input["action"].as_str().unwrap_or_default() {
            "add" => self.add(&input, ctx).await,
            "list" => self.list().await,
            "remove" => self.remove(&input).await,
            other => Ok(ToolOutput::error(format!("Unknown action: {other}"))),
        }
    }
}
