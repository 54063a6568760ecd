// SPDX-FileCopyrightText: 2026 Skiff Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Runs due cron jobs through the agent loop.

use std::sync::Arc;

use async_trait::async_trait;
use skiff_agent::AgentLoop;
use skiff_bus::MessageBus;
use skiff_core::{InboundMessage, OutboundMessage, SessionKey, SkiffError};
use skiff_cron::{CronJob, JobHandler};
use tracing::{debug, info};

/// Sender id stamped on job messages.
pub const CRON_SENDER: &str = "cron";

/// Feeds each job's message to the agent under its own `cron:<id>` session
/// and, when the job asks for it, delivers the answer to the job's target.
pub struct AgentJobHandler {
    agent: Arc<AgentLoop>,
    bus: Arc<MessageBus>,
}

impl AgentJobHandler {
    pub fn new(agent: Arc<AgentLoop>) -> Self {
        let bus = agent.bus().clone();
        Self { agent, bus }
    }
}

#[async_trait]
impl JobHandler for AgentJobHandler {
    async fn on_job(&self, job: &CronJob) -> Result<Option<String>, SkiffError> {
        let payload = &job.payload;
        let channel = payload.channel.as_deref().unwrap_or("cli");
        let chat_id = payload.to.as_deref().unwrap_or("direct");

        let msg = InboundMessage::new(channel, CRON_SENDER, chat_id, &payload.message)
            .with_metadata("cron_job_id", job.id.as_str());
        let key = SessionKey::from(format!("cron:{}", job.id));
        let reply = self.agent.process_direct(msg, Some(key)).await?;

        if payload.deliver {
            self.bus
                .publish_outbound(OutboundMessage::new(channel, chat_id, &reply.content))
                .await?;
            info!(job_id = %job.id, channel, chat_id, "cron reply delivered");
        } else {
            debug!(job_id = %job.id, "cron reply kept in session only");
        }
        Ok(Some(reply.content))
    }
}
