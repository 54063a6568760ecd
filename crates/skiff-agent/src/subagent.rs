// SPDX-FileCopyrightText: 2026 Skiff Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Supervised background subagents.
//!
//! A subagent runs its own tool loop with its own prompt, iteration bound,
//! and registry view, and keeps no session state. A supervisor task awaits
//! the worker and turns whatever happened (result, forced stop, error,
//! panic, timeout) into exactly one system message on the inbound bus,
//! addressed to the conversation that spawned it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use skiff_bus::MessageBus;
use skiff_config::model::SubagentConfig;
use skiff_core::{
    ChatMessage, InboundMessage, Role, SESSION_KEY_METADATA, SessionKey, SessionRecord, SkiffError,
};
use skiff_tools::ToolContext;
use strum::{AsRefStr, Display};
use tokio::sync::Mutex;
use tokio::task::JoinError;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::context::ContextBuilder;
use crate::tool_loop::{DiscardTranscript, ToolLoop, TurnInput, TurnOutcome, TurnResult};

/// Tools a subagent never gets: no recursive spawning, no direct messaging.
pub const SUBAGENT_EXCLUDED_TOOLS: &[&str] = &["spawn", "message"];

/// Sender id of the announcements subagents publish.
pub const SUBAGENT_SENDER: &str = "subagent";

pub type SubagentId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum SubagentStatus {
    Completed,
    ForcedStop,
    Failed,
}

/// A subagent that has not reported back yet.
#[derive(Debug, Clone)]
pub struct SubagentInfo {
    pub id: SubagentId,
    pub label: String,
    pub task: String,
    pub origin_channel: String,
    pub origin_chat_id: String,
    /// Session the report is recorded against.
    pub origin_session: SessionKey,
    pub started_at: DateTime<Utc>,
}

/// How the worker task ended, as seen by its supervisor.
enum WorkerExit {
    Finished(TurnResult),
    Crashed(JoinError),
    TimedOut(Duration),
}

pub struct SubagentSpawner {
    tool_loop: ToolLoop,
    bus: Arc<MessageBus>,
    timeout: Option<Duration>,
    running: Arc<Mutex<HashMap<SubagentId, SubagentInfo>>>,
}

impl SubagentSpawner {
    /// Derives the subagent loop from the main one: same provider, restricted
    /// registry, and the subagent iteration bound.
    pub fn new(base: &ToolLoop, bus: Arc<MessageBus>, config: &SubagentConfig) -> Self {
        let allowed = &config.allowed_tools;
        let registry = base.registry().restricted(|name| {
            !SUBAGENT_EXCLUDED_TOOLS.contains(&name)
                && (allowed.is_empty() || allowed.iter().any(|a| a == name))
        });
        let timeout = match config.timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };
        Self {
            tool_loop: base.derive(Arc::new(registry), config.max_iterations),
            bus,
            timeout,
            running: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Tool names the subagent loop can call.
    pub fn tool_names(&self) -> Vec<String> {
        self.tool_loop
            .registry()
            .names()
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    /// Starts a subagent and returns its id without waiting for it.
    ///
    /// The report goes back to `origin`'s chat and session, which differ
    /// when the calling turn ran under an overridden key.
    pub async fn spawn(&self, task: &str, label: Option<&str>, origin: &ToolContext) -> SubagentId {
        let id: SubagentId = Uuid::new_v4().simple().to_string()[..8].to_string();
        let label = label
            .filter(|l| !l.trim().is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| default_label(task));
        let info = SubagentInfo {
            id: id.clone(),
            label,
            task: task.to_string(),
            origin_channel: origin.channel.clone(),
            origin_chat_id: origin.chat_id.clone(),
            origin_session: origin.session_key.clone(),
            started_at: Utc::now(),
        };
        self.running.lock().await.insert(id.clone(), info.clone());
        info!(subagent_id = %id, label = %info.label, "subagent spawned");

        let tool_loop = self.tool_loop.clone();
        let worker_info = info.clone();
        let worker = tokio::spawn(async move {
            let inbound = InboundMessage::new(
                &worker_info.origin_channel,
                SUBAGENT_SENDER,
                &worker_info.origin_chat_id,
                &worker_info.task,
            );
            let tool_ctx =
                ToolContext::new(&worker_info.origin_channel, &worker_info.origin_chat_id);
            tool_loop
                .run(TurnInput {
                    history: &[],
                    inbound: &inbound,
                    context: &SubagentContext,
                    tool_ctx: &tool_ctx,
                    transcript: &DiscardTranscript,
                })
                .await
        });

        let bus = self.bus.clone();
        let running = self.running.clone();
        let timeout = self.timeout;
        tokio::spawn(async move {
            let abort = worker.abort_handle();
            let exit = match timeout {
                Some(limit) => match tokio::time::timeout(limit, worker).await {
                    Ok(joined) => joined.map_or_else(WorkerExit::Crashed, WorkerExit::Finished),
                    Err(_) => {
                        abort.abort();
                        WorkerExit::TimedOut(limit)
                    }
                },
                None => worker
                    .await
                    .map_or_else(WorkerExit::Crashed, WorkerExit::Finished),
            };

            running.lock().await.remove(&info.id);
            let (status, result) = summarize_exit(&info, exit);
            announce(&bus, &info, status, &result).await;
        });

        id
    }

    /// Subagents that have not reported back yet, oldest first.
    pub async fn running(&self) -> Vec<SubagentInfo> {
        let mut list: Vec<_> = self.running.lock().await.values().cloned().collect();
        list.sort_by_key(|s| s.started_at);
        list
    }

    pub async fn running_count(&self) -> usize {
        self.running.lock().await.len()
    }
}

fn default_label(task: &str) -> String {
    let trimmed = task.trim();
    match trimmed.char_indices().nth(30) {
        Some((cut, _)) => format!("{}...", &trimmed[..cut]),
        None => trimmed.to_string(),
    }
}

fn summarize_exit(info: &SubagentInfo, exit: WorkerExit) -> (SubagentStatus, String) {
    match exit {
        WorkerExit::Finished(result) => match result.outcome {
            TurnOutcome::Success => (SubagentStatus::Completed, result.content),
            TurnOutcome::ForcedStop => (SubagentStatus::ForcedStop, result.content),
            TurnOutcome::Error(e) => {
                warn!(subagent_id = %info.id, error = %e, "subagent failed");
                (SubagentStatus::Failed, format!("Error: {e}"))
            }
        },
        WorkerExit::Crashed(e) => {
            error!(subagent_id = %info.id, error = %e, "subagent worker crashed");
            (SubagentStatus::Failed, "Error: the task crashed unexpectedly".into())
        }
        WorkerExit::TimedOut(limit) => {
            warn!(subagent_id = %info.id, limit = ?limit, "subagent timed out");
            (
                SubagentStatus::Failed,
                format!("Error: the task did not finish within {}s", limit.as_secs()),
            )
        }
    }
}

async fn announce(bus: &MessageBus, info: &SubagentInfo, status: SubagentStatus, result: &str) {
    let outcome = match status {
        SubagentStatus::Completed => "completed successfully",
        SubagentStatus::ForcedStop => "stopped at its step limit",
        SubagentStatus::Failed => "failed",
    };
    let content = format!(
        "[Subagent '{}' {outcome}]\n\nTask: {}\n\nResult:\n{result}\n\n\
         Summarize this naturally for the user. Keep it brief (1-2 sentences). \
         Do not mention technical details like \"subagent\" or task IDs.",
        info.label, info.task
    );
    let msg = InboundMessage::system(
        SUBAGENT_SENDER,
        &info.origin_channel,
        &info.origin_chat_id,
        content,
    )
    .with_metadata(SESSION_KEY_METADATA, info.origin_session.as_str())
    .with_metadata("subagent_id", info.id.clone())
    .with_metadata("label", info.label.clone())
    .with_metadata("status", status.as_ref());

    match bus.publish_inbound(msg).await {
        Ok(_) => info!(subagent_id = %info.id, %status, "subagent reported back"),
        Err(e) => error!(subagent_id = %info.id, error = %e, "failed to publish subagent result"),
    }
}

/// Prompt for a subagent: the task is the whole conversation.
struct SubagentContext;

#[async_trait]
impl ContextBuilder for SubagentContext {
    async fn build_messages(
        &self,
        _history: &[SessionRecord],
        inbound: &InboundMessage,
    ) -> Result<Vec<ChatMessage>, SkiffError> {
        let prompt = format!(
            "You are a subagent spawned to complete one task in the background.\n\n\
             ## Rules\n\
             - Stay focused on the task. Do not start side quests.\n\
             - Your final reply is handed back to the main agent, so make it self-contained.\n\
             - You cannot message the user or spawn further subagents.\n\n\
             Current time: {}",
            Utc::now().format("%Y-%m-%d %H:%M (%A) UTC")
        );
        Ok(vec![
            ChatMessage::new(Role::System, prompt),
            ChatMessage::new(Role::User, inbound.content.clone()),
        ])
    }
}
