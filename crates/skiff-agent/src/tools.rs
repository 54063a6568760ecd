// SPDX-FileCopyrightText: 2026 Skiff Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Built-in tools backed by the agent runtime itself.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};
use skiff_bus::MessageBus;
use skiff_core::{OutboundMessage, SkiffError};
use skiff_tools::{SideEffect, Tool, ToolContext, ToolOutput};

use crate::subagent::SubagentSpawner;

/// `spawn`: hands a task to a background subagent.
pub struct SpawnTool {
    spawner: Arc<SubagentSpawner>,
}

impl SpawnTool {
    pub fn new(spawner: Arc<SubagentSpawner>) -> Self {
        Self { spawner }
    }
}

#[async_trait]
impl Tool for SpawnTool {
    fn name(&self) -> &str {
        "spawn"
    }

    fn description(&self) -> &str {
        "Spawn a subagent to handle a task in the background. Use this for complex or \
         time-consuming tasks that can run independently. The subagent reports back \
         when it finishes."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "task": {
                    "type": "string",
                    "minLength": 1,
                    "description": "The task for the subagent to complete"
                },
                "label": {
                    "type": "string",
                    "description": "Optional short label for the task (for display)"
                }
            },
            "required": ["task"]
        })
    }

    fn side_effect(&self) -> SideEffect {
        SideEffect::Process
    }

    async fn invoke(&self, input: Value, ctx: &ToolContext) -> Result<ToolOutput, SkiffError> {
        let task = input["task"]
            .as_str()
            .ok_or_else(|| SkiffError::tool("`task` must be a string"))?;
        let label = input.get("label").and_then(Value::as_str);

        let id = self.spawner.spawn(task, label, ctx).await;
        Ok(ToolOutput::ok(format!(
            "Subagent started (id: {id}). It will report back when it completes."
        )))
    }
}

/// `message`: sends text to a chat without ending the turn.
pub struct MessageTool {
    bus: Arc<MessageBus>,
}

impl MessageTool {
    pub fn new(bus: Arc<MessageBus>) -> Self {
        Self { bus }
    }
}

#[async_trait]
impl Tool for MessageTool {
    fn name(&self) -> &str {
        "message"
    }

    fn description(&self) -> &str {
        "Send a message to the user. Defaults to the current chat; pass channel and \
         chat_id to reach a different one."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "content": { "type": "string", "description": "The message text" },
                "channel": { "type": "string", "description": "Target channel (optional)" },
                "chat_id": { "type": "string", "description": "Target chat id (optional)" }
            },
            "required": ["content"]
        })
    }

    fn side_effect(&self) -> SideEffect {
        SideEffect::Messaging
    }

    async fn invoke(&self, input: Value, ctx: &ToolContext) -> Result<ToolOutput, SkiffError> {
        let content = input["content"].as_str().unwrap_or_default();
        let channel = input
            .get("channel")
            .and_then(Value::as_str)
            .unwrap_or(ctx.channel.as_str());
        let chat_id = input
            .get("chat_id")
            .and_then(Value::as_str)
            .unwrap_or(ctx.chat_id.as_str());

        match self
            .bus
            .publish_outbound(OutboundMessage::new(channel, chat_id, content))
            .await
        {
            Ok(_) => Ok(ToolOutput::ok(format!("Message sent to {channel}:{chat_id}"))),
            Err(e) => Ok(ToolOutput::error(format!("Error sending message: {e}"))),
        }
    }
}
