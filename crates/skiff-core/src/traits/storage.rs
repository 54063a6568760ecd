// SPDX-FileCopyrightText: 2026 Skiff Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Storage adapter trait for persistence backends.

use async_trait::async_trait;

use crate::error::SkiffError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{SessionKey, SessionRecord};

/// Adapter for durable session history and scheduled job documents.
///
/// Every write is durable when the returned future resolves. Session records
/// are append-only; job documents are replaced whole.
#[async_trait]
pub trait StorageAdapter: PluginAdapter {
    /// Initializes the storage backend (migrations, connection, etc.).
    async fn initialize(&self) -> Result<(), SkiffError>;

    /// Closes the storage backend, flushing pending writes.
    async fn close(&self) -> Result<(), SkiffError>;

    // --- Sessions ---

    /// Appends a record to a session, creating the session row if needed.
    ///
    /// User records bump the session's user message counter in the same
    /// transaction. Returns the counter after the write.
    async fn append_record(
        &self,
        key: &SessionKey,
        record: &SessionRecord,
    ) -> Result<u64, SkiffError>;

    /// Loads every record of a session in append order.
    async fn load_records(&self, key: &SessionKey) -> Result<Vec<SessionRecord>, SkiffError>;

    /// Returns the user message counter, or 0 for an unknown session.
    async fn user_message_count(&self, key: &SessionKey) -> Result<u64, SkiffError>;

    /// Resets the user message counter to zero.
    async fn reset_user_message_count(&self, key: &SessionKey) -> Result<(), SkiffError>;

    /// Lists all known session keys.
    async fn list_session_keys(&self) -> Result<Vec<SessionKey>, SkiffError>;

    // --- Cron job documents ---

    /// Returns every stored job document as `(id, json)`.
    async fn list_cron_documents(&self) -> Result<Vec<(String, String)>, SkiffError>;

    /// Inserts or replaces a job document.
    async fn upsert_cron_document(&self, id: &str, document: &str) -> Result<(), SkiffError>;

    /// Replaces a job document only if it still exists. Returns false when it
    /// was removed in the meantime.
    async fn update_cron_document(&self, id: &str, document: &str) -> Result<bool, SkiffError>;

    /// Removes a job document. Returns false when there was nothing to remove.
    async fn delete_cron_document(&self, id: &str) -> Result<bool, SkiffError>;
}
