// SPDX-FileCopyrightText: 2026 Skiff Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adapter trait definitions for the Skiff plugin architecture.
//!
//! All adapters extend the [`PluginAdapter`] base trait and use
//! `#[async_trait]` for dynamic dispatch compatibility.

pub mod adapter;
pub mod channel;
pub mod provider;
pub mod storage;

pub use adapter::PluginAdapter;
pub use channel::{ChannelAdapter, InboundSink};
pub use provider::{ProviderAdapter, ProviderStream};
pub use storage::StorageAdapter;
