// SPDX-FileCopyrightText: 2026 Skiff Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Connects chat surfaces to the bus.
//!
//! Every channel gets the bus as its inbound sink when started. A single
//! outbound task drains the outbound queue and routes each message to the
//! channel named in its `channel` field.

use std::collections::BTreeMap;
use std::sync::Arc;

use skiff_bus::MessageBus;
use skiff_core::{ChannelAdapter, HealthStatus, InboundSink, OutboundMessage, SkiffError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub struct ChannelManager {
    channels: BTreeMap<String, Arc<dyn ChannelAdapter>>,
    bus: Arc<MessageBus>,
}

impl ChannelManager {
    pub fn new(bus: Arc<MessageBus>) -> Self {
        Self {
            channels: BTreeMap::new(),
            bus,
        }
    }

    /// Registers a channel under its adapter name. Rejects duplicate names.
    pub fn add_channel(&mut self, channel: Arc<dyn ChannelAdapter>) -> Result<(), SkiffError> {
        let name = channel.name().to_string();
        if self.channels.contains_key(&name) {
            return Err(SkiffError::Config(format!(
                "channel `{name}` is registered twice"
            )));
        }
        self.channels.insert(name, channel);
        Ok(())
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn names(&self) -> Vec<&str> {
        self.channels.keys().map(String::as_str).collect()
    }

    /// Starts every channel with the bus as its sink. A channel that fails
    /// to start is logged and skipped. Returns how many started.
    pub async fn start_all(&self) -> usize {
        let sink: Arc<dyn InboundSink> = self.bus.clone();
        let mut started = 0;
        for (name, channel) in &self.channels {
            match channel.start(sink.clone()).await {
                Ok(()) => {
                    started += 1;
                    info!(channel = %name, "channel started");
                }
                Err(e) => warn!(channel = %name, error = %e, "channel failed to start"),
            }
        }
        started
    }

    /// Routes outbound messages until cancelled or the bus closes.
    pub async fn run_outbound(&self, cancel: CancellationToken) {
        loop {
            tokio::select! {
                msg = self.bus.consume_outbound() => match msg {
                    Some(msg) => self.route(msg).await,
                    None => break,
                },
                _ = cancel.cancelled() => break,
            }
        }
        debug!("outbound router stopped");
    }

    async fn route(&self, msg: OutboundMessage) {
        let Some(channel) = self.channels.get(&msg.channel) else {
            warn!(
                channel = %msg.channel,
                chat_id = %msg.chat_id,
                "no channel registered for outbound message, dropping it"
            );
            return;
        };
        let (name, chat_id) = (msg.channel.clone(), msg.chat_id.clone());
        if let Err(e) = channel.send(msg).await {
            warn!(channel = %name, chat_id = %chat_id, error = %e, "outbound delivery failed");
        }
    }

    /// Delivers whatever is still queued without waiting for more.
    pub async fn flush_outbound(&self) -> usize {
        let mut flushed = 0;
        while let Some(msg) = self.bus.try_consume_outbound().await {
            self.route(msg).await;
            flushed += 1;
        }
        flushed
    }

    /// Stops every channel, then shuts its adapter down.
    pub async fn stop_all(&self) {
        for (name, channel) in &self.channels {
            if let Err(e) = channel.stop().await {
                warn!(channel = %name, error = %e, "channel stop error");
            }
            if let Err(e) = channel.shutdown().await {
                warn!(channel = %name, error = %e, "channel shutdown error");
            }
        }
    }

    /// Aggregate health: any unhealthy or degraded channel degrades the whole.
    pub async fn health_check(&self) -> HealthStatus {
        let mut problems = Vec::new();
        for (name, channel) in &self.channels {
            match channel.health_check().await {
                Ok(HealthStatus::Healthy) => {}
                Ok(HealthStatus::Degraded(reason) | HealthStatus::Unhealthy(reason)) => {
                    problems.push(format!("{name}: {reason}"));
                }
                Err(e) => problems.push(format!("{name}: {e}")),
            }
        }
        if problems.is_empty() {
            HealthStatus::Healthy
        } else {
            HealthStatus::Degraded(problems.join("; "))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use skiff_config::model::BusConfig;
    use skiff_core::InboundMessage;
    use skiff_test_utils::MockChannel;

    use super::*;

    fn bus() -> Arc<MessageBus> {
        Arc::new(MessageBus::new(&BusConfig::default()))
    }

    #[tokio::test]
    async fn duplicate_channel_names_are_rejected() {
        let mut manager = ChannelManager::new(bus());
        manager.add_channel(Arc::new(MockChannel::new("cli"))).unwrap();
        assert!(manager.add_channel(Arc::new(MockChannel::new("cli"))).is_err());
        assert_eq!(manager.channel_count(), 1);
    }

    #[tokio::test]
    async fn started_channel_feeds_inbound_queue() {
        let bus = bus();
        let channel = Arc::new(MockChannel::new("telegram"));
        let mut manager = ChannelManager::new(bus.clone());
        manager.add_channel(channel.clone()).unwrap();
        assert_eq!(manager.start_all().await, 1);

        channel
            .inject(InboundMessage::new("telegram", "u", "1", "hello"))
            .await
            .unwrap();
        assert_eq!(bus.consume_inbound().await.unwrap().content, "hello");
    }

    #[tokio::test]
    async fn outbound_is_routed_by_channel_name() {
        let bus = bus();
        let telegram = Arc::new(MockChannel::new("telegram"));
        let discord = Arc::new(MockChannel::new("discord"));
        let mut manager = ChannelManager::new(bus.clone());
        manager.add_channel(telegram.clone()).unwrap();
        manager.add_channel(discord.clone()).unwrap();
        let manager = Arc::new(manager);

        let cancel = CancellationToken::new();
        let router = tokio::spawn({
            let manager = manager.clone();
            let cancel = cancel.clone();
            async move { manager.run_outbound(cancel).await }
        });

        bus.publish_outbound(OutboundMessage::new("nowhere", "x", "lost"))
            .await
            .unwrap();
        bus.publish_outbound(OutboundMessage::new("discord", "room", "hi"))
            .await
            .unwrap();

        let sent = discord.wait_for_sent(1, Duration::from_secs(2)).await;
        assert_eq!(sent[0].content, "hi");
        assert!(telegram.sent().is_empty());

        cancel.cancel();
        router.await.unwrap();
    }

    #[tokio::test]
    async fn flush_delivers_queued_replies() {
        let bus = bus();
        let cli = Arc::new(MockChannel::new("cli"));
        let mut manager = ChannelManager::new(bus.clone());
        manager.add_channel(cli.clone()).unwrap();

        for text in ["one", "two"] {
            bus.publish_outbound(OutboundMessage::new("cli", "direct", text))
                .await
                .unwrap();
        }
        assert_eq!(manager.flush_outbound().await, 2);
        let sent: Vec<String> = cli.sent().into_iter().map(|m| m.content).collect();
        assert_eq!(sent, vec!["one", "two"]);
    }

    #[tokio::test]
    async fn health_degrades_when_a_channel_is_unhealthy() {
        let channel = Arc::new(MockChannel::new("cli"));
        let mut manager = ChannelManager::new(bus());
        manager.add_channel(channel.clone()).unwrap();
        assert_eq!(manager.health_check().await, HealthStatus::Healthy);

        channel.set_health(HealthStatus::Unhealthy("socket closed".into()));
        assert!(matches!(
            manager.health_check().await,
            HealthStatus::Degraded(reason) if reason.contains("socket closed")
        ));
    }
}
