// SPDX-FileCopyrightText: 2026 Skiff Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock channel adapter for testing.
//!
//! `MockChannel` captures sent messages for assertions and lets tests inject
//! inbound messages through the sink it was started with.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use skiff_core::{
    AdapterType, ChannelAdapter, HealthStatus, InboundMessage, InboundSink, OutboundMessage,
    PluginAdapter, SkiffError,
};
use tokio::sync::Notify;

pub struct MockChannel {
    name: String,
    sink: Mutex<Option<Arc<dyn InboundSink>>>,
    sent: Mutex<Vec<OutboundMessage>>,
    sent_notify: Notify,
    health: Mutex<HealthStatus>,
}

fn locked<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MockChannel {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sink: Mutex::new(None),
            sent: Mutex::new(Vec::new()),
            sent_notify: Notify::new(),
            health: Mutex::new(HealthStatus::Healthy),
        }
    }

    /// Submits `msg` as if a user had typed it. Fails before `start`.
    pub async fn inject(&self, msg: InboundMessage) -> Result<(), SkiffError> {
        let sink = locked(&self.sink)
            .clone()
            .ok_or_else(|| SkiffError::channel("mock channel is not started"))?;
        sink.submit(msg).await
    }

    /// Messages delivered to this channel so far.
    pub fn sent(&self) -> Vec<OutboundMessage> {
        locked(&self.sent).clone()
    }

    /// Waits until at least `count` messages were sent or `timeout` passes,
    /// then returns what was sent.
    pub async fn wait_for_sent(&self, count: usize, timeout: Duration) -> Vec<OutboundMessage> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.sent_notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let sent = self.sent();
            if sent.len() >= count {
                return sent;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.sent();
            }
        }
    }

    pub fn set_health(&self, status: HealthStatus) {
        *locked(&self.health) = status;
    }
}

#[async_trait]
impl PluginAdapter for MockChannel {
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Channel
    }

    async fn health_check(&self) -> Result<HealthStatus, SkiffError> {
        Ok(locked(&self.health).clone())
    }

    async fn shutdown(&self) -> Result<(), SkiffError> {
        Ok(())
    }
}

#[async_trait]
impl ChannelAdapter for MockChannel {
    async fn start(&self, sink: Arc<dyn InboundSink>) -> Result<(), SkiffError> {
        *locked(&self.sink) = Some(sink);
        Ok(())
    }

    async fn stop(&self) -> Result<(), SkiffError> {
        locked(&self.sink).take();
        Ok(())
    }

    async fn send(&self, msg: OutboundMessage) -> Result<(), SkiffError> {
        locked(&self.sent).push(msg);
        self.sent_notify.notify_waiters();
        Ok(())
    }
}
