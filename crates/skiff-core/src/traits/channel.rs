// SPDX-FileCopyrightText: 2026 Skiff Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Channel adapter trait for chat surface integrations.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::SkiffError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{InboundMessage, OutboundMessage};

/// Where a channel pushes the messages it receives.
///
/// Implemented by the message bus; kept as a trait here so channel adapters
/// only depend on the core crate.
#[async_trait]
pub trait InboundSink: Send + Sync {
    /// Admits one inbound message, subject to the sink's backpressure policy.
    async fn submit(&self, msg: InboundMessage) -> Result<(), SkiffError>;
}

/// Adapter for a bidirectional chat surface.
///
/// A channel owns its wire protocol. Once started it pushes every received
/// message into the sink, and the runtime calls `send` for replies.
#[async_trait]
pub trait ChannelAdapter: PluginAdapter {
    /// Begins receiving messages and forwarding them to `sink`.
    async fn start(&self, sink: Arc<dyn InboundSink>) -> Result<(), SkiffError>;

    /// Stops receiving messages.
    async fn stop(&self) -> Result<(), SkiffError>;

    /// Delivers a message to the surface.
    async fn send(&self, msg: OutboundMessage) -> Result<(), SkiffError>;
}
