// SPDX-FileCopyrightText: 2026 Skiff Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Agent loop and session management for the Skiff runtime.
//!
//! The [`AgentLoop`] is the central coordinator that:
//! - Consumes inbound messages from the bus
//! - Routes them to per-session actors so each conversation stays ordered
//! - Runs the bounded provider/tool loop for every turn
//! - Publishes exactly one reply per turn
//! - Drains active sessions on shutdown

pub mod channel_manager;
pub mod context;
pub mod dispatcher;
pub mod session;
pub mod shutdown;
pub mod subagent;
pub mod tool_loop;
pub mod tools;

use std::sync::Arc;
use std::time::Duration;

use skiff_bus::MessageBus;
use skiff_config::SkiffConfig;
use skiff_core::{InboundMessage, OutboundMessage, ProviderAdapter, SessionKey, SkiffError};
use skiff_tools::ToolRegistry;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub use channel_manager::ChannelManager;
pub use context::{ContextBuilder, DefaultContextBuilder};
pub use dispatcher::{BUSY_REPLY, Delivery, ERROR_REPLY, MessageProcessor, SessionDispatcher};
pub use session::{Session, SessionStore};
pub use subagent::{SubagentInfo, SubagentSpawner, SubagentStatus};
pub use tool_loop::{LoopSettings, LoopState, ToolLoop, TurnOutcome, TurnResult};
pub use tools::{MessageTool, SpawnTool};

/// How long shutdown waits for in-flight turns.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Per-session mailbox depth.
const SESSION_QUEUE_DEPTH: usize = 32;

/// The main agent loop that connects the bus, sessions, and the tool loop.
pub struct AgentLoop {
    bus: Arc<MessageBus>,
    dispatcher: SessionDispatcher,
    sessions: Arc<SessionStore>,
    spawner: Arc<SubagentSpawner>,
    drain_timeout: Duration,
}

impl AgentLoop {
    /// Wires the runtime together.
    ///
    /// `registry` holds the application tools. The subagent view is derived
    /// from it first; `spawn` and `message` are then added for the main loop.
    pub fn new(
        bus: Arc<MessageBus>,
        provider: Arc<dyn ProviderAdapter>,
        mut registry: ToolRegistry,
        sessions: Arc<SessionStore>,
        context: Arc<dyn ContextBuilder>,
        config: &SkiffConfig,
    ) -> Result<Self, SkiffError> {
        let settings = LoopSettings::from_config(&config.agent, &config.provider);

        let base = ToolLoop::new(
            provider.clone(),
            Arc::new(registry.clone()),
            settings.clone(),
        );
        let spawner = Arc::new(SubagentSpawner::new(&base, bus.clone(), &config.subagent));

        registry.register(Arc::new(SpawnTool::new(spawner.clone())))?;
        registry.register(Arc::new(MessageTool::new(bus.clone())))?;
        let tool_loop = ToolLoop::new(provider, Arc::new(registry), settings);

        let processor = Arc::new(MessageProcessor::new(
            sessions.clone(),
            context,
            tool_loop,
            bus.clone(),
            config.agent.history_window,
        ));
        let dispatcher = SessionDispatcher::new(
            processor,
            SESSION_QUEUE_DEPTH,
            Duration::from_secs(config.agent.session_idle_secs),
        );

        info!(
            agent_name = config.agent.name.as_str(),
            max_iterations = config.agent.max_iterations,
            "agent loop initialized"
        );

        Ok(Self {
            bus,
            dispatcher,
            sessions,
            spawner,
            drain_timeout: DRAIN_TIMEOUT,
        })
    }

    /// Overrides how long shutdown waits for in-flight turns.
    pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    /// Consumes the inbound queue until cancelled or the bus closes, then
    /// drains the session actors.
    pub async fn run(&self, cancel: CancellationToken) {
        info!("agent loop running");

        loop {
            tokio::select! {
                msg = self.bus.consume_inbound() => match msg {
                    Some(inbound) => self.dispatcher.dispatch(inbound, None, Delivery::Bus).await,
                    None => {
                        info!("inbound queue closed, stopping agent loop");
                        break;
                    }
                },
                _ = cancel.cancelled() => {
                    info!("shutdown signal received, stopping agent loop");
                    break;
                }
            }
        }

        shutdown::drain_sessions(&self.dispatcher, self.drain_timeout).await;
        info!("agent loop stopped");
    }

    /// Processes one message through the same per-session ordering as bus
    /// traffic and returns the reply instead of publishing it.
    ///
    /// `session_key` overrides the key derived from the message.
    pub async fn process_direct(
        &self,
        msg: InboundMessage,
        session_key: Option<SessionKey>,
    ) -> Result<OutboundMessage, SkiffError> {
        let (tx, rx) = oneshot::channel();
        self.dispatcher
            .dispatch(msg, session_key, Delivery::Direct(tx))
            .await;
        rx.await
            .map_err(|_| SkiffError::Internal("session actor dropped the request".into()))?
    }

    pub fn bus(&self) -> &Arc<MessageBus> {
        &self.bus
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    pub fn spawner(&self) -> &Arc<SubagentSpawner> {
        &self.spawner
    }

    /// Session actors that are still running.
    pub async fn active_sessions(&self) -> usize {
        self.dispatcher.active_count().await
    }
}
