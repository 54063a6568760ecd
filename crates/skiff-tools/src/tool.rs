// SPDX-FileCopyrightText: 2026 Skiff Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The tool contract and the per-call context handed to executors.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use skiff_core::{InboundMessage, SessionKey, SkiffError};
use strum::Display;

/// Output from a tool invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutput {
    /// The content returned by the tool (text output, JSON, etc.).
    pub content: String,
    /// Whether the tool itself reports the invocation as failed.
    pub is_error: bool,
}

impl ToolOutput {
    pub fn ok(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
        }
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: true,
        }
    }
}

/// What a tool can touch outside the process. Logged with every execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SideEffect {
    None,
    Filesystem,
    Network,
    Process,
    Messaging,
    Scheduling,
}

/// The conversation a tool call was made from.
///
/// Passed explicitly to every invocation so tools never hold a mutable
/// "current chat" that concurrent sessions could race on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolContext {
    pub channel: String,
    pub chat_id: String,
    pub session_key: SessionKey,
}

impl ToolContext {
    pub fn new(channel: impl Into<String>, chat_id: impl Into<String>) -> Self {
        let channel = channel.into();
        let chat_id = chat_id.into();
        let session_key = SessionKey::new(&channel, &chat_id);
        Self {
            channel,
            chat_id,
            session_key,
        }
    }

    /// Context for replies to `msg`, resolving system messages to their origin.
    pub fn for_inbound(msg: &InboundMessage) -> Self {
        let (channel, chat_id) = msg.reply_target();
        Self::new(channel, chat_id)
    }
}

/// Unified trait for every tool the model can call.
///
/// The registry validates `input` against [`Tool::parameters_schema`] before
/// `invoke` runs, so implementations may rely on the schema's required
/// fields and types being present.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Returns the tool's unique name (used for lookup and API serialization).
    fn name(&self) -> &str;

    /// Returns a human-readable description of what the tool does.
    fn description(&self) -> &str;

    /// Returns the JSON Schema describing the tool's input parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Side-effect class for auditing.
    fn side_effect(&self) -> SideEffect {
        SideEffect::None
    }

    /// Invokes the tool with validated JSON input.
    async fn invoke(
        &self,
        input: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<ToolOutput, SkiffError>;
}
