// SPDX-FileCopyrightText: 2026 Skiff Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Admin subcommands. They work on the database directly, so they are safe
//! to run while a runtime is serving: the cron timer reloads the store on
//! every wake.

pub mod cron;
pub mod session;

use std::sync::Arc;

use skiff_config::SkiffConfig;
use skiff_core::{SkiffError, StorageAdapter};
use skiff_storage::SqliteStorage;

pub use cron::CronCommand;
pub use session::SessionCommand;

/// Opens the configured database, running migrations if needed.
pub async fn open_storage(config: &SkiffConfig) -> Result<Arc<dyn StorageAdapter>, SkiffError> {
    let storage = SqliteStorage::new(config.storage.clone());
    storage.initialize().await?;
    Ok(Arc::new(storage))
}
