// SPDX-FileCopyrightText: 2026 Skiff Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Cron job document operations. Every write replaces one whole document.

use rusqlite::params;
use skiff_core::SkiffError;

use crate::database::{Database, map_tr_err};

/// All job documents as `(id, json)`, in id order.
pub async fn list_documents(db: &Database) -> Result<Vec<(String, String)>, SkiffError> {
    db.connection()
        .call(|conn| {
            let mut stmt = conn.prepare("SELECT id, document FROM cron_jobs ORDER BY id")?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?;
            rows.collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(map_tr_err)
}

/// Insert a document, replacing any existing one with the same id.
pub async fn upsert_document(db: &Database, id: &str, document: &str) -> Result<(), SkiffError> {
    let id = id.to_string();
    let document = document.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO cron_jobs (id, document) VALUES (?1, ?2)
                 ON CONFLICT(id) DO UPDATE SET document = excluded.document,
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
                params![id, document],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Replace a document only if the job still exists.
pub async fn update_document(db: &Database, id: &str, document: &str) -> Result<bool, SkiffError> {
    let id = id.to_string();
    let document = document.to_string();
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                "UPDATE cron_jobs SET document = ?2,
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?1",
                params![id, document],
            )?;
            Ok(changed > 0)
        })
        .await
        .map_err(map_tr_err)
}

/// Delete a document. Returns false if it was already gone.
pub async fn delete_document(db: &Database, id: &str) -> Result<bool, SkiffError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            let changed = conn.execute("DELETE FROM cron_jobs WHERE id = ?1", params![id])?;
            Ok(changed > 0)
        })
        .await
        .map_err(map_tr_err)
}
