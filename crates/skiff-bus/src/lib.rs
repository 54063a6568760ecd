// SPDX-FileCopyrightText: 2026 Skiff Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message bus decoupling chat surfaces from the agent loop.
//!
//! Two independent bounded FIFO queues: inbound (surfaces, cron, and
//! subagents produce; the agent loop consumes) and outbound (the agent loop
//! produces; the channel manager consumes). Delivery is at-most-once and in
//! memory only. Whatever is queued when the process dies is lost.
//!
//! When a queue is full the producer experiences the configured
//! [`OverflowPolicy`]: wait (bounded by a timeout), fail fast, or evict the
//! oldest message. Producers always learn which one happened.

mod queue;

use std::time::Duration;

use async_trait::async_trait;
use skiff_config::OverflowPolicy;
use skiff_config::model::BusConfig;
use skiff_core::{InboundMessage, InboundSink, OutboundMessage, SkiffError};
use tracing::debug;

pub use queue::PublishOutcome;
use queue::BoundedQueue;

/// The runtime's inbound and outbound queues.
pub struct MessageBus {
    inbound: BoundedQueue<InboundMessage>,
    outbound: BoundedQueue<OutboundMessage>,
    policy: OverflowPolicy,
}

impl MessageBus {
    /// Creates a bus with the capacities and policy from `config`.
    pub fn new(config: &BusConfig) -> Self {
        let timeout = match config.publish_timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        };
        Self {
            inbound: BoundedQueue::new(
                "inbound",
                config.inbound_capacity,
                config.overflow_policy,
                timeout,
            ),
            outbound: BoundedQueue::new(
                "outbound",
                config.outbound_capacity,
                config.overflow_policy,
                timeout,
            ),
            policy: config.overflow_policy,
        }
    }

    /// The overflow policy both queues follow.
    pub fn policy(&self) -> OverflowPolicy {
        self.policy
    }

    /// Queues a message for the agent loop.
    pub async fn publish_inbound(
        &self,
        msg: InboundMessage,
    ) -> Result<PublishOutcome, SkiffError> {
        debug!(channel = %msg.channel, chat_id = %msg.chat_id, "publish inbound");
        self.inbound.push(msg).await
    }

    /// Queues a message for delivery to a surface.
    pub async fn publish_outbound(
        &self,
        msg: OutboundMessage,
    ) -> Result<PublishOutcome, SkiffError> {
        debug!(channel = %msg.channel, chat_id = %msg.chat_id, "publish outbound");
        self.outbound.push(msg).await
    }

    /// Waits for the next inbound message. `None` once closed and drained.
    pub async fn consume_inbound(&self) -> Option<InboundMessage> {
        self.inbound.pop().await
    }

    /// Waits for the next outbound message. `None` once closed and drained.
    pub async fn consume_outbound(&self) -> Option<OutboundMessage> {
        self.outbound.pop().await
    }

    /// Takes the next inbound message if one is queued.
    pub async fn try_consume_inbound(&self) -> Option<InboundMessage> {
        self.inbound.try_pop().await
    }

    /// Takes the next outbound message if one is queued.
    pub async fn try_consume_outbound(&self) -> Option<OutboundMessage> {
        self.outbound.try_pop().await
    }

    pub async fn inbound_len(&self) -> usize {
        self.inbound.len().await
    }

    pub async fn outbound_len(&self) -> usize {
        self.outbound.len().await
    }

    pub fn inbound_capacity(&self) -> usize {
        self.inbound.capacity()
    }

    pub fn outbound_capacity(&self) -> usize {
        self.outbound.capacity()
    }

    /// Messages evicted from the inbound queue under `drop_oldest`.
    pub fn dropped_inbound(&self) -> u64 {
        self.inbound.dropped()
    }

    /// Messages evicted from the outbound queue under `drop_oldest`.
    pub fn dropped_outbound(&self) -> u64 {
        self.outbound.dropped()
    }

    /// Closes both queues. Producers fail with [`SkiffError::BusClosed`];
    /// consumers drain what is left and then receive `None`.
    pub async fn close(&self) {
        self.inbound.close().await;
        self.outbound.close().await;
    }

    pub fn is_closed(&self) -> bool {
        self.inbound.is_closed()
    }
}

#[async_trait]
impl InboundSink for MessageBus {
    async fn submit(&self, msg: InboundMessage) -> Result<(), SkiffError> {
        self.publish_inbound(msg).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn bus(capacity: usize, policy: OverflowPolicy, timeout_ms: u64) -> MessageBus {
        MessageBus::new(&BusConfig {
            inbound_capacity: capacity,
            outbound_capacity: capacity,
            overflow_policy: policy,
            publish_timeout_ms: timeout_ms,
        })
    }

    fn inbound(content: &str) -> InboundMessage {
        InboundMessage::new("cli", "user", "direct", content)
    }

    #[tokio::test]
    async fn inbound_is_fifo() {
        let bus = bus(8, OverflowPolicy::Block, 0);
        for i in 0..5 {
            bus.publish_inbound(inbound(&i.to_string())).await.unwrap();
        }
        for i in 0..5 {
            assert_eq!(bus.consume_inbound().await.unwrap().content, i.to_string());
        }
    }

    #[tokio::test]
    async fn queues_are_independent() {
        let bus = bus(1, OverflowPolicy::Reject, 0);
        bus.publish_inbound(inbound("in")).await.unwrap();
        bus.publish_outbound(OutboundMessage::new("cli", "direct", "out"))
            .await
            .unwrap();
        assert_eq!(bus.inbound_len().await, 1);
        assert_eq!(bus.outbound_len().await, 1);
        assert_eq!(bus.consume_outbound().await.unwrap().content, "out");
    }

    #[tokio::test]
    async fn reject_policy_fails_fast() {
        let bus = bus(2, OverflowPolicy::Reject, 0);
        bus.publish_inbound(inbound("a")).await.unwrap();
        bus.publish_inbound(inbound("b")).await.unwrap();
        let err = bus.publish_inbound(inbound("c")).await.unwrap_err();
        assert!(matches!(
            err,
            SkiffError::BusOverflow {
                queue: "inbound",
                capacity: 2
            }
        ));
        assert_eq!(bus.consume_inbound().await.unwrap().content, "a");
    }

    #[tokio::test]
    async fn drop_oldest_reports_displacement() {
        let bus = bus(2, OverflowPolicy::DropOldest, 0);
        assert_eq!(
            bus.publish_inbound(inbound("a")).await.unwrap(),
            PublishOutcome::Enqueued
        );
        bus.publish_inbound(inbound("b")).await.unwrap();
        assert_eq!(
            bus.publish_inbound(inbound("c")).await.unwrap(),
            PublishOutcome::DisplacedOldest
        );
        assert_eq!(bus.dropped_inbound(), 1);
        assert_eq!(bus.consume_inbound().await.unwrap().content, "b");
        assert_eq!(bus.consume_inbound().await.unwrap().content, "c");
    }

    #[tokio::test]
    async fn block_policy_waits_for_space() {
        let bus = Arc::new(bus(1, OverflowPolicy::Block, 0));
        bus.publish_inbound(inbound("first")).await.unwrap();

        let mut blocked = tokio_test::task::spawn({
            let bus = bus.clone();
            async move { bus.publish_inbound(inbound("second")).await }
        });
        assert!(blocked.poll().is_pending());

        assert_eq!(bus.consume_inbound().await.unwrap().content, "first");
        assert!(blocked.is_woken());
        match blocked.poll() {
            std::task::Poll::Ready(result) => assert_eq!(result.unwrap(), PublishOutcome::Enqueued),
            std::task::Poll::Pending => panic!("publish should complete once space frees"),
        }
        assert_eq!(bus.consume_inbound().await.unwrap().content, "second");
    }

    #[tokio::test(start_paused = true)]
    async fn block_policy_times_out() {
        let bus = bus(1, OverflowPolicy::Block, 50);
        bus.publish_inbound(inbound("first")).await.unwrap();
        let err = bus.publish_inbound(inbound("second")).await.unwrap_err();
        assert!(matches!(err, SkiffError::BusOverflow { .. }));
    }

    #[tokio::test]
    async fn consumer_wakes_on_publish() {
        let bus = Arc::new(bus(4, OverflowPolicy::Block, 0));
        let consumer = tokio::spawn({
            let bus = bus.clone();
            async move { bus.consume_inbound().await }
        });
        tokio::task::yield_now().await;
        bus.publish_inbound(inbound("hello")).await.unwrap();
        let got = consumer.await.unwrap().unwrap();
        assert_eq!(got.content, "hello");
    }

    #[tokio::test]
    async fn close_drains_then_ends() {
        let bus = bus(4, OverflowPolicy::Block, 0);
        bus.publish_inbound(inbound("left")).await.unwrap();
        bus.close().await;
        assert!(bus.is_closed());
        assert!(matches!(
            bus.publish_inbound(inbound("late")).await,
            Err(SkiffError::BusClosed)
        ));
        assert_eq!(bus.consume_inbound().await.unwrap().content, "left");
        assert!(bus.consume_inbound().await.is_none());
    }

    #[tokio::test]
    async fn close_releases_waiting_consumer() {
        let bus = Arc::new(bus(4, OverflowPolicy::Block, 0));
        let consumer = tokio::spawn({
            let bus = bus.clone();
            async move { bus.consume_outbound().await }
        });
        tokio::task::yield_now().await;
        bus.close().await;
        assert!(consumer.await.unwrap().is_none());
    }

    #[tokio::test]
    async fn sink_submit_publishes_inbound() {
        let bus = bus(4, OverflowPolicy::Block, 0);
        let sink: &dyn InboundSink = &bus;
        sink.submit(inbound("via sink")).await.unwrap();
        assert_eq!(bus.try_consume_inbound().await.unwrap().content, "via sink");
    }
}
