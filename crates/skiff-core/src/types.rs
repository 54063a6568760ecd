// SPDX-FileCopyrightText: 2026 Skiff Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types shared across the Skiff runtime.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Channel name reserved for messages the runtime injects into its own inbound queue.
pub const SYSTEM_CHANNEL: &str = "system";

/// Metadata key a system message uses to name the session it belongs to.
pub const SESSION_KEY_METADATA: &str = "session_key";

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Identifies the type of adapter in the plugin registry.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    Channel,
    Provider,
    Storage,
}

// --- Session keys ---

/// Composite conversation key in the form `channel:chat_id`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionKey(String);

impl SessionKey {
    /// Builds a key from its channel and chat components.
    pub fn new(channel: &str, chat_id: &str) -> Self {
        Self(format!("{channel}:{chat_id}"))
    }

    /// Returns the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Splits the key back into `(channel, chat_id)`.
    ///
    /// Only the first `:` separates the two; chat ids may contain colons.
    pub fn parts(&self) -> Option<(&str, &str)> {
        self.0.split_once(':')
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for SessionKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SessionKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// --- Bus messages ---

/// A message received from an external surface (or injected by the runtime).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Originating surface identifier (e.g. "telegram", "cli", "system").
    pub channel: String,
    /// Identifier of the sender on that surface.
    pub sender_id: String,
    /// Conversation identifier on that surface.
    pub chat_id: String,
    /// Text content.
    pub content: String,
    /// Attached media references (paths or URLs).
    #[serde(default)]
    pub media: Vec<String>,
    /// Free-form surface metadata.
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    /// When the message was received.
    pub timestamp: DateTime<Utc>,
}

impl InboundMessage {
    /// Creates a text message stamped with the current time.
    pub fn new(
        channel: impl Into<String>,
        sender_id: impl Into<String>,
        chat_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            channel: channel.into(),
            sender_id: sender_id.into(),
            chat_id: chat_id.into(),
            content: content.into(),
            media: Vec::new(),
            metadata: HashMap::new(),
            timestamp: Utc::now(),
        }
    }

    /// Creates a runtime-injected message addressed back to `origin_channel:origin_chat_id`.
    pub fn system(
        sender_id: impl Into<String>,
        origin_channel: &str,
        origin_chat_id: &str,
        content: impl Into<String>,
    ) -> Self {
        Self::new(
            SYSTEM_CHANNEL,
            sender_id,
            format!("{origin_channel}:{origin_chat_id}"),
            content,
        )
    }

    /// Adds a metadata entry.
    pub fn with_metadata(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    /// Returns true if this message was injected by the runtime itself.
    pub fn is_system(&self) -> bool {
        self.channel == SYSTEM_CHANNEL
    }

    /// Returns the `(channel, chat_id)` a reply to this message must go to.
    ///
    /// System messages carry their origin in `chat_id`; when it is malformed
    /// the reply falls back to the CLI surface.
    pub fn reply_target(&self) -> (String, String) {
        if self.is_system() {
            match self.chat_id.split_once(':') {
                Some((channel, chat)) => (channel.to_string(), chat.to_string()),
                None => ("cli".to_string(), self.chat_id.clone()),
            }
        } else {
            (self.channel.clone(), self.chat_id.clone())
        }
    }

    /// Returns the session this message belongs to.
    ///
    /// System messages may name it in [`SESSION_KEY_METADATA`]; every other
    /// message maps to `channel:chat_id`.
    pub fn session_key(&self) -> SessionKey {
        if self.is_system()
            && let Some(key) = self.metadata.get(SESSION_KEY_METADATA).and_then(|v| v.as_str())
        {
            return SessionKey::from(key);
        }
        let (channel, chat_id) = self.reply_target();
        SessionKey::new(&channel, &chat_id)
    }
}

/// A message to deliver to an external surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
    /// Target surface identifier.
    pub channel: String,
    /// Target conversation on that surface.
    pub chat_id: String,
    /// Text content.
    pub content: String,
    /// Optional surface message id this is a reply to.
    #[serde(default)]
    pub reply_to: Option<String>,
    /// Attached media references.
    #[serde(default)]
    pub media: Vec<String>,
    /// Free-form surface metadata.
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl OutboundMessage {
    /// Creates a plain text outbound message.
    pub fn new(
        channel: impl Into<String>,
        chat_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            channel: channel.into(),
            chat_id: chat_id.into(),
            content: content.into(),
            reply_to: None,
            media: Vec::new(),
            metadata: HashMap::new(),
        }
    }
}

// --- Conversation records ---

/// Author of a conversation record.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Provider-assigned call id, echoed back in the matching result.
    pub id: String,
    /// Registered tool name.
    pub name: String,
    /// Raw JSON arguments as produced by the model.
    pub arguments: serde_json::Value,
}

/// Why a tool call failed.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ToolErrorKind {
    UnknownTool,
    InvalidArgs,
    ExecutionFailed,
    Timeout,
}

/// Outcome of a single tool call, always fed back to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub call_id: String,
    pub name: String,
    pub content: String,
    #[serde(default)]
    pub error: Option<ToolErrorKind>,
}

impl ToolResult {
    /// A successful result.
    pub fn ok(call: &ToolCall, content: impl Into<String>) -> Self {
        Self {
            call_id: call.id.clone(),
            name: call.name.clone(),
            content: content.into(),
            error: None,
        }
    }

    /// A failed result carrying a model-readable explanation.
    pub fn failed(call: &ToolCall, kind: ToolErrorKind, content: impl Into<String>) -> Self {
        Self {
            call_id: call.id.clone(),
            name: call.name.clone(),
            content: content.into(),
            error: Some(kind),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// One entry in a session's append-only history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    /// For `tool` records: the call this result answers.
    #[serde(default)]
    pub tool_call_id: Option<String>,
    /// For `tool` records: the tool that produced the result.
    #[serde(default)]
    pub tool_name: Option<String>,
    /// For `assistant` records: the calls the model requested.
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
}

impl SessionRecord {
    fn plain(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
            tool_call_id: None,
            tool_name: None,
            tool_calls: Vec::new(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::plain(Role::User, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::plain(Role::System, content)
    }

    pub fn assistant(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls,
            ..Self::plain(Role::Assistant, content)
        }
    }

    pub fn tool(result: &ToolResult) -> Self {
        Self {
            tool_call_id: Some(result.call_id.clone()),
            tool_name: Some(result.name.clone()),
            ..Self::plain(Role::Tool, result.content.clone())
        }
    }
}

// --- Provider types ---

/// A message in provider-neutral form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_call_id: None,
            tool_name: None,
            tool_calls: Vec::new(),
        }
    }
}

impl From<&SessionRecord> for ChatMessage {
    fn from(record: &SessionRecord) -> Self {
        Self {
            role: record.role,
            content: record.content.clone(),
            tool_call_id: record.tool_call_id.clone(),
            tool_name: record.tool_name.clone(),
            tool_calls: record.tool_calls.clone(),
        }
    }
}

/// A request to an LLM provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    /// Provider-format tool definitions.
    #[serde(default)]
    pub tools: Vec<serde_json::Value>,
    pub max_tokens: u32,
    #[serde(default)]
    pub temperature: Option<f32>,
}

/// Token usage reported by a provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// A complete response from an LLM provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderResponse {
    /// Text content; may be empty when only tool calls were produced.
    pub content: String,
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default)]
    pub finish_reason: Option<String>,
    #[serde(default)]
    pub usage: TokenUsage,
}

impl ProviderResponse {
    /// A text-only response.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            finish_reason: Some("stop".into()),
            ..Default::default()
        }
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// One chunk of a streamed provider response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderStreamChunk {
    #[serde(default)]
    pub delta: Option<String>,
    #[serde(default)]
    pub tool_call: Option<ToolCall>,
    #[serde(default)]
    pub usage: Option<TokenUsage>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}
