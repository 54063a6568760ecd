// SPDX-FileCopyrightText: 2026 Skiff Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end integration testing.
//!
//! `TestHarness` assembles a complete agent stack: scripted provider, real
//! bus, SQLite storage in a temp directory, and the agent loop. Provides
//! `send()` to drive one turn and `start()` to run the bus consumer.

use std::sync::Arc;

use skiff_agent::{AgentLoop, DefaultContextBuilder, SessionStore};
use skiff_bus::MessageBus;
use skiff_config::SkiffConfig;
use skiff_core::{InboundMessage, OutboundMessage, SkiffError, StorageAdapter};
use skiff_storage::SqliteStorage;
use skiff_tools::{Tool, ToolRegistry};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::echo_tool::EchoTool;
use crate::mock_provider::{MockProvider, MockReply};

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    replies: Vec<MockReply>,
    fallback: Option<MockReply>,
    tools: Vec<Arc<dyn Tool>>,
    config: SkiffConfig,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        let mut config = SkiffConfig::default();
        config.provider.max_retries = 0;
        config.provider.retry_backoff_ms = 1;
        config.provider.timeout_secs = 5;
        Self {
            replies: Vec::new(),
            fallback: None,
            tools: Vec::new(),
            config,
        }
    }

    /// Scripted provider replies, consumed in order.
    pub fn with_replies(mut self, replies: impl IntoIterator<Item = MockReply>) -> Self {
        self.replies.extend(replies);
        self
    }

    /// Reply used once the script runs out.
    pub fn with_fallback(mut self, reply: MockReply) -> Self {
        self.fallback = Some(reply);
        self
    }

    /// Registers an extra tool next to `echo`.
    pub fn with_tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.tools.push(tool);
        self
    }

    /// Adjusts the configuration before the stack is built.
    pub fn configure(mut self, f: impl FnOnce(&mut SkiffConfig)) -> Self {
        f(&mut self.config);
        self
    }

    /// Build the harness, creating all required subsystems.
    pub async fn build(self) -> Result<TestHarness, SkiffError> {
        let temp_dir = tempfile::TempDir::new().map_err(SkiffError::storage)?;
        let mut config = self.config;
        config.storage.database_path = temp_dir.path().join("test.db").display().to_string();

        let storage = SqliteStorage::new(config.storage.clone());
        storage.initialize().await?;
        let storage: Arc<dyn StorageAdapter> = Arc::new(storage);

        let mut provider = MockProvider::new(self.replies);
        if let Some(fallback) = self.fallback {
            provider = provider.with_fallback(fallback);
        }
        let provider = Arc::new(provider);

        let mut registry = ToolRegistry::from_config(&config.tools);
        registry.register(Arc::new(EchoTool))?;
        for tool in self.tools {
            registry.register(tool)?;
        }

        let bus = Arc::new(MessageBus::new(&config.bus));
        let sessions = Arc::new(SessionStore::new(storage.clone()));
        let agent = Arc::new(AgentLoop::new(
            bus.clone(),
            provider.clone(),
            registry,
            sessions,
            Arc::new(DefaultContextBuilder::new("You are a test assistant.")),
            &config,
        )?);

        Ok(TestHarness {
            provider,
            bus,
            storage,
            agent,
            config,
            _temp_dir: temp_dir,
        })
    }
}

/// A complete test environment with a mock provider and temp storage.
pub struct TestHarness {
    pub provider: Arc<MockProvider>,
    pub bus: Arc<MessageBus>,
    /// SQLite storage adapter (temp DB, cleaned up on drop).
    pub storage: Arc<dyn StorageAdapter>,
    pub agent: Arc<AgentLoop>,
    pub config: SkiffConfig,
    _temp_dir: tempfile::TempDir,
}

impl TestHarness {
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// Runs one CLI turn through the full pipeline and returns the reply.
    pub async fn send(&self, text: &str) -> Result<OutboundMessage, SkiffError> {
        self.agent
            .process_direct(InboundMessage::new("cli", "test-user", "direct", text), None)
            .await
    }

    /// Starts the bus consumer. Cancel the token to stop it; the handle
    /// resolves once sessions have drained.
    pub fn start(&self) -> (CancellationToken, JoinHandle<()>) {
        let cancel = CancellationToken::new();
        let agent = self.agent.clone();
        let token = cancel.clone();
        let handle = tokio::spawn(async move { agent.run(token).await });
        (cancel, handle)
    }
}
