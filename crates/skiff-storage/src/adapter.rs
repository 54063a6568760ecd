// SPDX-FileCopyrightText: 2026 Skiff Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the StorageAdapter trait.

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::debug;

use skiff_config::model::StorageConfig;
use skiff_core::{
    AdapterType, HealthStatus, PluginAdapter, SessionKey, SessionRecord, SkiffError,
    StorageAdapter,
};

use crate::database::Database;
use crate::queries;

/// SQLite-backed storage adapter.
///
/// The database is opened on [`StorageAdapter::initialize`]; every other
/// operation fails until then.
pub struct SqliteStorage {
    config: StorageConfig,
    db: OnceCell<Database>,
}

impl SqliteStorage {
    /// Create a new SqliteStorage with the given configuration.
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            db: OnceCell::new(),
        }
    }

    /// Wrap an already opened database (used for in-memory stores).
    pub fn from_database(db: Database) -> Self {
        Self {
            config: StorageConfig {
                database_path: ":memory:".to_string(),
                wal_mode: false,
            },
            db: OnceCell::new_with(Some(db)),
        }
    }

    /// The underlying Database, or an error if not initialized.
    pub fn database(&self) -> Result<&Database, SkiffError> {
        self.db.get().ok_or_else(|| SkiffError::Storage {
            source: "storage not initialized -- call initialize() first".into(),
        })
    }
}

#[async_trait]
impl PluginAdapter for SqliteStorage {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Storage
    }

    async fn health_check(&self) -> Result<HealthStatus, SkiffError> {
        let Ok(db) = self.database() else {
            return Ok(HealthStatus::Unhealthy("not initialized".into()));
        };
        db.connection()
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("SELECT 1;")?;
                Ok(())
            })
            .await
            .map_err(crate::database::map_tr_err)?;
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), SkiffError> {
        if self.db.initialized() {
            self.close().await?;
        }
        Ok(())
    }
}

#[async_trait]
impl StorageAdapter for SqliteStorage {
    async fn initialize(&self) -> Result<(), SkiffError> {
        let db = Database::open(&self.config.database_path, self.config.wal_mode).await?;
        self.db.set(db).map_err(|_| SkiffError::Storage {
            source: "storage already initialized".into(),
        })?;
        debug!(path = %self.config.database_path, "SQLite storage initialized");
        Ok(())
    }

    async fn close(&self) -> Result<(), SkiffError> {
        self.database()?.checkpoint().await?;
        debug!("WAL checkpoint complete");
        Ok(())
    }

    async fn append_record(
        &self,
        key: &SessionKey,
        record: &SessionRecord,
    ) -> Result<u64, SkiffError> {
        queries::sessions::append_record(self.database()?, key, record).await
    }

    async fn load_records(&self, key: &SessionKey) -> Result<Vec<SessionRecord>, SkiffError> {
        queries::sessions::load_records(self.database()?, key, None).await
    }

    async fn user_message_count(&self, key: &SessionKey) -> Result<u64, SkiffError> {
        queries::sessions::user_message_count(self.database()?, key).await
    }

    async fn reset_user_message_count(&self, key: &SessionKey) -> Result<(), SkiffError> {
        queries::sessions::reset_user_message_count(self.database()?, key).await
    }

    async fn list_session_keys(&self) -> Result<Vec<SessionKey>, SkiffError> {
        queries::sessions::list_session_keys(self.database()?).await
    }

    async fn list_cron_documents(&self) -> Result<Vec<(String, String)>, SkiffError> {
        queries::cron::list_documents(self.database()?).await
    }

    async fn upsert_cron_document(&self, id: &str, document: &str) -> Result<(), SkiffError> {
        queries::cron::upsert_document(self.database()?, id, document).await
    }

    async fn update_cron_document(&self, id: &str, document: &str) -> Result<bool, SkiffError> {
        queries::cron::update_document(self.database()?, id, document).await
    }

    async fn delete_cron_document(&self, id: &str) -> Result<bool, SkiffError> {
        queries::cron::delete_document(self.database()?, id).await
    }
}
