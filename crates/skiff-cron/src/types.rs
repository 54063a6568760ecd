// SPDX-FileCopyrightText: 2026 Skiff Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Job documents as they are persisted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use skiff_core::SkiffError;
use strum::{AsRefStr, Display};

/// When a job fires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CronSchedule {
    /// Once, at a fixed instant.
    At { at: DateTime<Utc> },
    /// Repeatedly, every `every_secs` seconds after the previous run.
    Every { every_secs: u64 },
    /// A cron expression, evaluated in `tz` (an IANA zone name) or UTC.
    Cron {
        expr: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tz: Option<String>,
    },
}

impl CronSchedule {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::At { .. } => "at",
            Self::Every { .. } => "every",
            Self::Cron { .. } => "cron",
        }
    }

    /// Short human form used in listings.
    pub fn describe(&self) -> String {
        match self {
            Self::At { at } => format!("at {}", at.to_rfc3339()),
            Self::Every { every_secs } => format!("every {every_secs}s"),
            Self::Cron { expr, tz: Some(tz) } => format!("cron '{expr}' ({tz})"),
            Self::Cron { expr, tz: None } => format!("cron '{expr}' (UTC)"),
        }
    }
}

/// What a job does when it fires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CronPayload {
    /// Text handed to the agent as if a user had sent it.
    pub message: String,
    /// Whether the agent's answer is delivered to `channel`/`to`.
    #[serde(default)]
    pub deliver: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
}

impl CronPayload {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            deliver: false,
            channel: None,
            to: None,
        }
    }

    /// Delivers the answer to `channel`/`to`.
    pub fn deliver_to(mut self, channel: impl Into<String>, to: impl Into<String>) -> Self {
        self.deliver = true;
        self.channel = Some(channel.into());
        self.to = Some(to.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RunStatus {
    Ok,
    Error,
}

/// Mutable run bookkeeping.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CronJobState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_run_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_status: Option<RunStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// A scheduled job, stored as one JSON document keyed by `id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CronJob {
    pub id: String,
    pub name: String,
    pub enabled: bool,
    pub schedule: CronSchedule,
    pub payload: CronPayload,
    #[serde(default)]
    pub state: CronJobState,
    #[serde(default)]
    pub delete_after_run: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CronJob {
    /// Enabled and due at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.enabled && self.state.next_run_at.is_some_and(|at| at <= now)
    }

    pub(crate) fn to_document(&self) -> Result<String, SkiffError> {
        serde_json::to_string(self)
            .map_err(|e| SkiffError::Internal(format!("failed to encode cron job {}: {e}", self.id)))
    }

    pub(crate) fn from_document(document: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(document)
    }
}

/// A request to create a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSpec {
    pub name: String,
    pub schedule: CronSchedule,
    pub payload: CronPayload,
    /// Defaults to true for one-shot `At` jobs and false otherwise.
    #[serde(default)]
    pub delete_after_run: Option<bool>,
}

impl JobSpec {
    pub fn new(name: impl Into<String>, schedule: CronSchedule, payload: CronPayload) -> Self {
        Self {
            name: name.into(),
            schedule,
            payload,
            delete_after_run: None,
        }
    }

    pub fn delete_after_run(mut self, delete: bool) -> Self {
        self.delete_after_run = Some(delete);
        self
    }

    pub(crate) fn resolved_delete_after_run(&self) -> bool {
        self.delete_after_run
            .unwrap_or(matches!(self.schedule, CronSchedule::At { .. }))
    }
}
