// SPDX-FileCopyrightText: 2026 Skiff Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Identity and lifecycle shared by every external collaborator.

use async_trait::async_trait;

use crate::error::SkiffError;
use crate::types::{AdapterType, HealthStatus};

/// Common surface of providers, channels, and storage backends.
///
/// Adapters are picked when the runtime is assembled; nothing downcasts
/// them later, so everything the core needs lives on these traits.
#[async_trait]
pub trait PluginAdapter: Send + Sync + 'static {
    /// Instance name. Channels are routed by it.
    fn name(&self) -> &str;

    fn version(&self) -> semver::Version;

    fn adapter_type(&self) -> AdapterType;

    async fn health_check(&self) -> Result<HealthStatus, SkiffError>;

    /// Releases held resources. Called once, after the adapter stopped.
    async fn shutdown(&self) -> Result<(), SkiffError>;
}
