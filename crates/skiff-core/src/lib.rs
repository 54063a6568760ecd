// SPDX-FileCopyrightText: 2026 Skiff Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Skiff assistant runtime.
//!
//! This crate provides the foundational trait definitions, error types, and
//! common types used throughout the Skiff workspace. Channel, provider, and
//! storage adapters implement traits defined here.

pub mod error;
pub mod traits;
pub mod types;

pub use error::SkiffError;
pub use types::{
    AdapterType, ChatMessage, HealthStatus, InboundMessage, OutboundMessage, ProviderRequest,
    ProviderResponse, ProviderStreamChunk, Role, SESSION_KEY_METADATA, SYSTEM_CHANNEL, SessionKey,
    SessionRecord, TokenUsage, ToolCall, ToolErrorKind, ToolResult,
};

pub use traits::{
    ChannelAdapter, InboundSink, PluginAdapter, ProviderAdapter, ProviderStream, StorageAdapter,
};
