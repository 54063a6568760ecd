// SPDX-FileCopyrightText: 2026 Skiff Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Runtime assembly: storage, bus, tools, agent loop, channels, and the
//! cron timer, wired together and run until shutdown.
//!
//! Provider and channel adapters are supplied by the embedding application
//! through [`RuntimeBuilder`]; the runtime itself never reads credentials.

use std::sync::Arc;

use skiff_agent::{AgentLoop, ChannelManager, ContextBuilder, DefaultContextBuilder, SessionStore};
use skiff_bus::MessageBus;
use skiff_config::SkiffConfig;
use skiff_core::{ChannelAdapter, HealthStatus, ProviderAdapter, SkiffError, StorageAdapter};
use skiff_cron::{CronService, CronTool};
use skiff_storage::SqliteStorage;
use skiff_tools::{Tool, ToolRegistry};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::jobs::AgentJobHandler;

pub struct RuntimeBuilder {
    config: SkiffConfig,
    provider: Option<Arc<dyn ProviderAdapter>>,
    storage: Option<Arc<dyn StorageAdapter>>,
    context: Option<Arc<dyn ContextBuilder>>,
    channels: Vec<Arc<dyn ChannelAdapter>>,
    tools: Vec<Arc<dyn Tool>>,
}

impl RuntimeBuilder {
    pub fn provider(mut self, provider: Arc<dyn ProviderAdapter>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Uses `storage` instead of opening `storage.database_path`.
    /// The adapter must already be initialized.
    pub fn storage(mut self, storage: Arc<dyn StorageAdapter>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn context(mut self, context: Arc<dyn ContextBuilder>) -> Self {
        self.context = Some(context);
        self
    }

    pub fn channel(mut self, channel: Arc<dyn ChannelAdapter>) -> Self {
        self.channels.push(channel);
        self
    }

    pub fn tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.tools.push(tool);
        self
    }

    pub async fn build(self) -> Result<Runtime, SkiffError> {
        let config = self.config;
        let provider = self
            .provider
            .ok_or_else(|| SkiffError::Config("no LLM provider configured".into()))?;

        let storage = match self.storage {
            Some(storage) => storage,
            None => {
                let storage = SqliteStorage::new(config.storage.clone());
                storage.initialize().await?;
                Arc::new(storage) as Arc<dyn StorageAdapter>
            }
        };

        let mut registry = ToolRegistry::from_config(&config.tools);
        for tool in self.tools {
            registry.register(tool)?;
        }

        let cron = if config.cron.enabled {
            let service = Arc::new(CronService::new(storage.clone(), &config.cron));
            registry.register(Arc::new(CronTool::new(service.clone())))?;
            Some(service)
        } else {
            info!("cron scheduler disabled by configuration");
            None
        };

        let context = match self.context {
            Some(context) => context,
            None => Arc::new(DefaultContextBuilder::from_config(&config.agent).await),
        };

        let bus = Arc::new(MessageBus::new(&config.bus));
        let sessions = Arc::new(SessionStore::new(storage.clone()));
        let agent = Arc::new(AgentLoop::new(
            bus.clone(),
            provider,
            registry,
            sessions,
            context,
            &config,
        )?);

        let mut channels = ChannelManager::new(bus.clone());
        for channel in self.channels {
            channels.add_channel(channel)?;
        }

        info!(
            channels = channels.channel_count(),
            cron = cron.is_some(),
            "runtime assembled"
        );

        Ok(Runtime {
            config,
            storage,
            bus,
            agent,
            channels: Arc::new(channels),
            cron,
        })
    }
}

/// A fully wired agent runtime.
pub struct Runtime {
    config: SkiffConfig,
    storage: Arc<dyn StorageAdapter>,
    bus: Arc<MessageBus>,
    agent: Arc<AgentLoop>,
    channels: Arc<ChannelManager>,
    cron: Option<Arc<CronService>>,
}

impl Runtime {
    pub fn builder(config: SkiffConfig) -> RuntimeBuilder {
        RuntimeBuilder {
            config,
            provider: None,
            storage: None,
            context: None,
            channels: Vec::new(),
            tools: Vec::new(),
        }
    }

    pub fn config(&self) -> &SkiffConfig {
        &self.config
    }

    pub fn agent(&self) -> &Arc<AgentLoop> {
        &self.agent
    }

    pub fn bus(&self) -> &Arc<MessageBus> {
        &self.bus
    }

    pub fn storage(&self) -> &Arc<dyn StorageAdapter> {
        &self.storage
    }

    pub fn cron(&self) -> Option<&Arc<CronService>> {
        self.cron.as_ref()
    }

    pub async fn health_check(&self) -> HealthStatus {
        self.channels.health_check().await
    }

    /// Runs until `cancel` fires, then shuts down in order: stop admitting,
    /// drain sessions, deliver the last replies, stop channels, close storage.
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), SkiffError> {
        let started = self.channels.start_all().await;
        if started == 0 && self.channels.channel_count() > 0 {
            warn!("no channel started; only cron and direct calls can reach the agent");
        }

        // The router outlives the agent loop so drained replies still go out.
        let router_cancel = CancellationToken::new();
        let router = tokio::spawn({
            let channels = self.channels.clone();
            let token = router_cancel.clone();
            async move { channels.run_outbound(token).await }
        });

        let timer = self.cron.clone().map(|service| {
            let handler = Arc::new(AgentJobHandler::new(self.agent.clone()));
            tokio::spawn(service.start(handler, cancel.child_token()))
        });

        info!(agent = %self.config.agent.name, "skiff runtime running");
        self.agent.run(cancel).await;

        if let Some(timer) = timer
            && let Err(e) = timer.await
        {
            error!(error = %e, "cron timer task failed");
        }
        router_cancel.cancel();
        if let Err(e) = router.await {
            error!(error = %e, "outbound router task failed");
        }
        let flushed = self.channels.flush_outbound().await;
        if flushed > 0 {
            info!(flushed, "delivered queued replies before shutdown");
        }

        self.channels.stop_all().await;
        self.bus.close().await;
        self.storage.close().await?;
        info!("skiff runtime stopped");
        Ok(())
    }

    /// [`Runtime::run`] with SIGTERM/Ctrl+C handling.
    pub async fn serve(&self) -> Result<(), SkiffError> {
        let cancel = skiff_agent::shutdown::install_signal_handler();
        self.run(cancel).await
    }
}
