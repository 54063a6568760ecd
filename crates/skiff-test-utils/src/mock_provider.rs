// SPDX-FileCopyrightText: 2026 Skiff Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock LLM provider adapter for deterministic testing.
//!
//! `MockProvider` implements `ProviderAdapter` with a script of replies:
//! plain text, tool calls, errors, panics, or any of those after a delay.
//! Every request is captured for later assertions.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream;
use skiff_core::{
    AdapterType, HealthStatus, PluginAdapter, ProviderAdapter, ProviderRequest, ProviderResponse,
    ProviderStream, ProviderStreamChunk, SkiffError, TokenUsage, ToolCall,
};

/// One scripted provider reply.
#[derive(Debug, Clone)]
pub enum MockReply {
    Text(String),
    ToolCalls(Vec<ToolCall>),
    /// Tool calls accompanied by some partial text.
    ToolCallsWithText(String, Vec<ToolCall>),
    Error(String),
    Panic,
    Delay(Duration, Box<MockReply>),
}

impl MockReply {
    pub fn text(content: impl Into<String>) -> Self {
        Self::Text(content.into())
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error(message.into())
    }

    /// A single tool call.
    pub fn call(id: &str, name: &str, arguments: serde_json::Value) -> Self {
        Self::ToolCalls(vec![ToolCall {
            id: id.to_string(),
            name: name.to_string(),
            arguments,
        }])
    }
}

/// A mock LLM provider that replays scripted replies.
///
/// Replies are popped from a FIFO queue. When the queue is empty the
/// fallback reply is used, which defaults to the text "mock response".
pub struct MockProvider {
    replies: Mutex<VecDeque<MockReply>>,
    fallback: MockReply,
    requests: Mutex<Vec<ProviderRequest>>,
}

fn locked<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MockProvider {
    pub fn new(replies: impl IntoIterator<Item = MockReply>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            fallback: MockReply::text("mock response"),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Reply used once the script runs out.
    pub fn with_fallback(mut self, reply: MockReply) -> Self {
        self.fallback = reply;
        self
    }

    pub fn push(&self, reply: MockReply) {
        locked(&self.replies).push_back(reply);
    }

    /// Every request received so far, in order.
    pub fn requests(&self) -> Vec<ProviderRequest> {
        locked(&self.requests).clone()
    }

    pub fn request_count(&self) -> usize {
        locked(&self.requests).len()
    }

    async fn respond(&self, request: ProviderRequest) -> Result<ProviderResponse, SkiffError> {
        locked(&self.requests).push(request);
        let mut reply = locked(&self.replies)
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());

        while let MockReply::Delay(delay, inner) = reply {
            tokio::time::sleep(delay).await;
            reply = *inner;
        }

        let usage = TokenUsage {
            input_tokens: 10,
            output_tokens: 20,
        };
        match reply {
            MockReply::Text(content) => Ok(ProviderResponse {
                usage,
                ..ProviderResponse::text(content)
            }),
            MockReply::ToolCalls(tool_calls) => Ok(ProviderResponse {
                content: String::new(),
                tool_calls,
                finish_reason: Some("tool_use".into()),
                usage,
            }),
            MockReply::ToolCallsWithText(content, tool_calls) => Ok(ProviderResponse {
                content,
                tool_calls,
                finish_reason: Some("tool_use".into()),
                usage,
            }),
            MockReply::Error(message) => Err(SkiffError::provider(message)),
            MockReply::Panic => panic!("mock provider scripted panic"),
            MockReply::Delay(..) => unreachable!("delays are unwrapped above"),
        }
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new([])
    }
}

#[async_trait]
impl PluginAdapter for MockProvider {
    fn name(&self) -> &str {
        "mock-provider"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Provider
    }

    async fn health_check(&self) -> Result<HealthStatus, SkiffError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), SkiffError> {
        Ok(())
    }
}

#[async_trait]
impl ProviderAdapter for MockProvider {
    async fn chat(&self, request: ProviderRequest) -> Result<ProviderResponse, SkiffError> {
        self.respond(request).await
    }

    async fn chat_stream(&self, request: ProviderRequest) -> Result<ProviderStream, SkiffError> {
        let response = self.respond(request).await?;

        let mut chunks = Vec::new();
        if !response.content.is_empty() {
            chunks.push(Ok(ProviderStreamChunk {
                delta: Some(response.content),
                ..Default::default()
            }));
        }
        for call in response.tool_calls {
            chunks.push(Ok(ProviderStreamChunk {
                tool_call: Some(call),
                ..Default::default()
            }));
        }
        chunks.push(Ok(ProviderStreamChunk {
            usage: Some(response.usage),
            finish_reason: response.finish_reason,
            ..Default::default()
        }));
        Ok(Box::pin(stream::iter(chunks)))
    }
}
