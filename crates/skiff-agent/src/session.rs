// SPDX-FileCopyrightText: 2026 Skiff Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session store: a write-through cache over the durable session log.
//!
//! Every append reaches storage before the in-memory copy changes, so a
//! record visible here always survives a restart. Mutation for a given key
//! is funneled through that key's dispatcher actor; the lock here only
//! protects the cache map itself.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use skiff_core::{SessionKey, SessionRecord, SkiffError, StorageAdapter};
use tokio::sync::RwLock;
use tracing::debug;

use crate::tool_loop::TranscriptSink;

/// One conversation's history as held in memory.
#[derive(Debug, Clone)]
pub struct Session {
    pub key: SessionKey,
    pub records: Vec<SessionRecord>,
    pub user_message_count: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    fn from_records(key: SessionKey, records: Vec<SessionRecord>, user_message_count: u64) -> Self {
        let now = Utc::now();
        let created_at = records.first().map(|r| r.timestamp).unwrap_or(now);
        let updated_at = records.last().map(|r| r.timestamp).unwrap_or(now);
        Self {
            key,
            records,
            user_message_count,
            created_at,
            updated_at,
        }
    }

    /// The most recent `max` records, oldest first.
    pub fn window(&self, max: usize) -> &[SessionRecord] {
        let start = self.records.len().saturating_sub(max);
        &self.records[start..]
    }
}

pub struct SessionStore {
    storage: Arc<dyn StorageAdapter>,
    cache: RwLock<HashMap<SessionKey, Session>>,
}

impl SessionStore {
    pub fn new(storage: Arc<dyn StorageAdapter>) -> Self {
        Self {
            storage,
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn storage(&self) -> &Arc<dyn StorageAdapter> {
        &self.storage
    }

    /// Returns a snapshot of the session, loading it from storage on a miss.
    pub async fn get_or_create(&self, key: &SessionKey) -> Result<Session, SkiffError> {
        if let Some(session) = self.cache.read().await.get(key) {
            return Ok(session.clone());
        }

        // Load outside the lock so a slow read does not stall other keys.
        let records = self.storage.load_records(key).await?;
        let count = self.storage.user_message_count(key).await?;
        debug!(session_key = %key, records = records.len(), "session loaded");

        let mut cache = self.cache.write().await;
        let session = cache
            .entry(key.clone())
            .or_insert_with(|| Session::from_records(key.clone(), records, count));
        Ok(session.clone())
    }

    /// Appends a record durably, then to the cached copy.
    ///
    /// Returns the session's user message count after the write.
    pub async fn append(&self, key: &SessionKey, record: SessionRecord) -> Result<u64, SkiffError> {
        let count = self.storage.append_record(key, &record).await?;

        let mut cache = self.cache.write().await;
        if let Some(session) = cache.get_mut(key) {
            session.updated_at = record.timestamp;
            session.user_message_count = count;
            session.records.push(record);
        }
        Ok(count)
    }

    /// The most recent `max_records` records of a session, oldest first.
    pub async fn history(
        &self,
        key: &SessionKey,
        max_records: usize,
    ) -> Result<Vec<SessionRecord>, SkiffError> {
        let session = self.get_or_create(key).await?;
        Ok(session.window(max_records).to_vec())
    }

    /// Reads the counter from storage, which may have been reset externally.
    pub async fn user_message_count(&self, key: &SessionKey) -> Result<u64, SkiffError> {
        let count = self.storage.user_message_count(key).await?;
        if let Some(session) = self.cache.write().await.get_mut(key) {
            session.user_message_count = count;
        }
        Ok(count)
    }

    pub async fn reset_user_message_count(&self, key: &SessionKey) -> Result<(), SkiffError> {
        self.storage.reset_user_message_count(key).await?;
        if let Some(session) = self.cache.write().await.get_mut(key) {
            session.user_message_count = 0;
        }
        Ok(())
    }

    /// Every session key known to storage.
    pub async fn list_keys(&self) -> Result<Vec<SessionKey>, SkiffError> {
        self.storage.list_session_keys().await
    }

    /// Number of sessions currently cached.
    pub async fn len(&self) -> usize {
        self.cache.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.cache.read().await.is_empty()
    }

    /// Drops the cached copy. The durable log is untouched.
    pub async fn evict(&self, key: &SessionKey) {
        if self.cache.write().await.remove(key).is_some() {
            debug!(session_key = %key, "session evicted from cache");
        }
    }
}

/// Writes a turn's records into one session.
pub struct SessionTranscript<'a> {
    store: &'a SessionStore,
    key: &'a SessionKey,
}

impl<'a> SessionTranscript<'a> {
    pub fn new(store: &'a SessionStore, key: &'a SessionKey) -> Self {
        Self { store, key }
    }
}

#[async_trait]
impl TranscriptSink for SessionTranscript<'_> {
    async fn append(&self, record: SessionRecord) -> Result<(), SkiffError> {
        self.store.append(self.key, record).await.map(|_| ())
    }
}
