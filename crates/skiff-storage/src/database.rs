// SPDX-FileCopyrightText: 2026 Skiff Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database connection management with PRAGMA setup, WAL mode, and migrations.
//!
//! All writes are serialized through tokio-rusqlite's single background
//! thread. Query modules accept `&Database` and go through
//! [`Database::connection`]; do not open a second connection for writes.

use std::path::Path;

use skiff_core::SkiffError;
use tracing::debug;

/// Convert a tokio-rusqlite error into [`SkiffError::Storage`].
pub(crate) fn map_tr_err(e: tokio_rusqlite::Error<rusqlite::Error>) -> SkiffError {
    SkiffError::storage(e)
}

/// Maps a decoding failure inside a row closure to a rusqlite error.
pub(crate) fn conversion_err(
    column: usize,
    err: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(column, rusqlite::types::Type::Text, Box::new(err))
}

/// The single SQLite connection shared by every query.
pub struct Database {
    conn: tokio_rusqlite::Connection,
}

impl Database {
    /// Open (creating if needed) the database at `path`, apply PRAGMAs, and
    /// run pending migrations.
    pub async fn open(path: &str, wal_mode: bool) -> Result<Self, SkiffError> {
        if let Some(parent) = Path::new(path).parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(SkiffError::storage)?;
        }
        let conn = tokio_rusqlite::Connection::open(path)
            .await
            .map_err(SkiffError::storage)?;
        let db = Self { conn };
        db.prepare(wal_mode).await?;
        debug!(path, wal_mode, "database opened");
        Ok(db)
    }

    /// Open a private in-memory database with the full schema.
    pub async fn open_in_memory() -> Result<Self, SkiffError> {
        let conn = tokio_rusqlite::Connection::open_in_memory()
            .await
            .map_err(SkiffError::storage)?;
        let db = Self { conn };
        db.prepare(false).await?;
        Ok(db)
    }

    async fn prepare(&self, wal_mode: bool) -> Result<(), SkiffError> {
        self.conn
            .call(move |conn| -> Result<(), rusqlite::Error> {
                if wal_mode {
                    conn.execute_batch("PRAGMA journal_mode = WAL;")?;
                }
                conn.execute_batch(
                    "PRAGMA synchronous = NORMAL;
                     PRAGMA foreign_keys = ON;
                     PRAGMA busy_timeout = 5000;",
                )?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;

        self.conn
            .call(|conn| crate::migrations::run_migrations(conn))
            .await
            .map_err(SkiffError::storage)
    }

    /// The underlying async connection.
    pub fn connection(&self) -> &tokio_rusqlite::Connection {
        &self.conn
    }

    /// Flush the WAL into the main database file.
    pub async fn checkpoint(&self) -> Result<(), SkiffError> {
        self.conn
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }
}
