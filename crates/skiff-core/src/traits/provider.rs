// SPDX-FileCopyrightText: 2026 Skiff Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Provider adapter trait for LLM integrations.

use std::pin::Pin;

use async_trait::async_trait;
use futures_core::Stream;

use crate::error::SkiffError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{ProviderRequest, ProviderResponse, ProviderStreamChunk};

/// Stream of response chunks returned by [`ProviderAdapter::chat_stream`].
pub type ProviderStream =
    Pin<Box<dyn Stream<Item = Result<ProviderStreamChunk, SkiffError>> + Send>>;

/// Adapter for LLM provider integrations.
///
/// Credentials and endpoints are instance configuration; implementations
/// must not read or write process-wide state.
#[async_trait]
pub trait ProviderAdapter: PluginAdapter {
    /// Sends a chat request and returns the full response.
    async fn chat(&self, request: ProviderRequest) -> Result<ProviderResponse, SkiffError>;

    /// Sends a chat request and returns a stream of response chunks.
    async fn chat_stream(&self, request: ProviderRequest) -> Result<ProviderStream, SkiffError>;
}
