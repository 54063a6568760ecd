// SPDX-FileCopyrightText: 2026 Skiff Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Context assembly for provider requests.
//!
//! A [`ContextBuilder`] turns a bounded window of session history plus the
//! current inbound message into the message list sent to the provider.

use async_trait::async_trait;
use chrono::Utc;
use skiff_config::model::AgentConfig;
use skiff_core::{ChatMessage, InboundMessage, Role, SessionRecord, SkiffError};
use tracing::{info, warn};

/// Builds the provider message list for one turn.
#[async_trait]
pub trait ContextBuilder: Send + Sync {
    /// `history` holds the records that precede `inbound`, oldest first.
    async fn build_messages(
        &self,
        history: &[SessionRecord],
        inbound: &InboundMessage,
    ) -> Result<Vec<ChatMessage>, SkiffError>;
}

/// Loads the system prompt following config priority: file > inline > default.
pub async fn load_system_prompt(config: &AgentConfig) -> String {
    if let Some(ref file_path) = config.system_prompt_file {
        match tokio::fs::read_to_string(file_path).await {
            Ok(content) if !content.trim().is_empty() => {
                info!(path = file_path.as_str(), "loaded system prompt from file");
                return content.trim().to_string();
            }
            Ok(_) => warn!(path = file_path.as_str(), "system prompt file is empty, falling back"),
            Err(e) => warn!(
                path = file_path.as_str(),
                error = %e,
                "failed to read system prompt file, falling back"
            ),
        }
    }

    if let Some(ref prompt) = config.system_prompt
        && !prompt.trim().is_empty()
    {
        return prompt.clone();
    }

    format!(
        "You are {}, a concise personal assistant. Use the available tools when they help, \
         and answer directly when they do not.",
        config.name
    )
}

/// Renders a runtime-injected message as the user turn the model sees.
pub(crate) fn system_turn(sender: &str, content: &str) -> String {
    format!("[System message from {sender}]\n{content}")
}

/// The default builder: system prompt with runtime facts, history, current message.
pub struct DefaultContextBuilder {
    system_prompt: String,
    workspace: Option<String>,
}

impl DefaultContextBuilder {
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            workspace: None,
        }
    }

    pub async fn from_config(config: &AgentConfig) -> Self {
        Self {
            system_prompt: load_system_prompt(config).await,
            workspace: config.workspace.clone(),
        }
    }

    fn system_message(&self, inbound: &InboundMessage) -> String {
        let (channel, chat_id) = inbound.reply_target();
        let mut prompt = format!(
            "{}\n\n## Runtime\nCurrent time: {}\nChannel: {channel}\nChat ID: {chat_id}",
            self.system_prompt,
            Utc::now().format("%Y-%m-%d %H:%M (%A) UTC"),
        );
        if let Some(ref ws) = self.workspace {
            prompt.push_str(&format!("\nWorkspace: {ws}"));
        }
        prompt
    }
}

#[async_trait]
impl ContextBuilder for DefaultContextBuilder {
    async fn build_messages(
        &self,
        history: &[SessionRecord],
        inbound: &InboundMessage,
    ) -> Result<Vec<ChatMessage>, SkiffError> {
        let mut messages = vec![ChatMessage::new(Role::System, self.system_message(inbound))];

        // A window cut can leave tool results whose assistant turn fell outside it.
        let start = history
            .iter()
            .position(|r| r.role != Role::Tool)
            .unwrap_or(history.len());

        for record in &history[start..] {
            let mut msg = ChatMessage::from(record);
            // Runtime-injected turns are stored already labelled.
            if record.role == Role::System {
                msg.role = Role::User;
            }
            messages.push(msg);
        }

        let mut content = if inbound.is_system() {
            system_turn(&inbound.sender_id, &inbound.content)
        } else {
            inbound.content.clone()
        };
        if !inbound.media.is_empty() {
            content.push_str(&format!("\n[attachments: {}]", inbound.media.join(", ")));
        }
        messages.push(ChatMessage::new(Role::User, content));
        Ok(messages)
    }
}
