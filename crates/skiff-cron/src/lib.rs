// SPDX-FileCopyrightText: 2026 Skiff Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Durable, timezone-aware job scheduler for the Skiff runtime.
//!
//! Jobs live as one JSON document each in the storage layer. The
//! [`CronService`] timer reloads the store on every wake, so jobs admitted
//! by another process (the `skiff cron` CLI, say) are picked up without a
//! restart. Due jobs are handed to a [`JobHandler`], which the runtime
//! implements by routing the job message through the agent loop.

pub mod schedule;
pub mod service;
pub mod tool;
pub mod types;

pub use schedule::{next_run, validate};
pub use service::{Clock, CronService, CronStatus, JobHandler};
pub use tool::CronTool;
pub use types::{CronJob, CronJobState, CronPayload, CronSchedule, JobSpec, RunStatus};
