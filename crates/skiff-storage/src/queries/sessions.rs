// SPDX-FileCopyrightText: 2026 Skiff Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session log and counter operations.

use std::str::FromStr;

use rusqlite::{OptionalExtension, params};
use skiff_core::{Role, SessionKey, SessionRecord, SkiffError, ToolCall};

use crate::database::{Database, conversion_err, map_tr_err};
use crate::models::{SessionSummary, format_timestamp, parse_timestamp};

/// Append a record, creating the session row if needed.
///
/// The insert and the user counter bump commit in one transaction, so a
/// crash leaves either both or neither. Returns the counter after the write.
pub async fn append_record(
    db: &Database,
    key: &SessionKey,
    record: &SessionRecord,
) -> Result<u64, SkiffError> {
    let key = key.as_str().to_string();
    let role = record.role.to_string();
    let content = record.content.clone();
    let tool_call_id = record.tool_call_id.clone();
    let tool_name = record.tool_name.clone();
    let tool_calls = if record.tool_calls.is_empty() {
        None
    } else {
        Some(serde_json::to_string(&record.tool_calls).map_err(SkiffError::storage)?)
    };
    let created_at = format_timestamp(&record.timestamp);
    let is_user = record.role == Role::User;

    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO sessions (session_key, created_at, updated_at)
                 VALUES (?1, ?2, ?2)
                 ON CONFLICT(session_key) DO UPDATE SET updated_at = excluded.updated_at",
                params![key, created_at],
            )?;
            tx.execute(
                "INSERT INTO session_records
                 (session_key, role, content, tool_call_id, tool_name, tool_calls, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![key, role, content, tool_call_id, tool_name, tool_calls, created_at],
            )?;
            if is_user {
                tx.execute(
                    "UPDATE sessions SET user_message_count = user_message_count + 1
                     WHERE session_key = ?1",
                    params![key],
                )?;
            }
            let count: i64 = tx.query_row(
                "SELECT user_message_count FROM sessions WHERE session_key = ?1",
                params![key],
                |row| row.get(0),
            )?;
            tx.commit()?;
            Ok(count as u64)
        })
        .await
        .map_err(map_tr_err)
}

fn record_from_row(row: &rusqlite::Row<'_>) -> Result<SessionRecord, rusqlite::Error> {
    let role: String = row.get(0)?;
    let role = Role::from_str(&role).map_err(|e| conversion_err(0, e))?;
    let tool_calls: Option<String> = row.get(4)?;
    let tool_calls: Vec<ToolCall> = match tool_calls {
        Some(json) => serde_json::from_str(&json).map_err(|e| conversion_err(4, e))?,
        None => Vec::new(),
    };
    let created_at: String = row.get(5)?;
    Ok(SessionRecord {
        role,
        content: row.get(1)?,
        timestamp: parse_timestamp(&created_at).map_err(|e| conversion_err(5, e))?,
        tool_call_id: row.get(2)?,
        tool_name: row.get(3)?,
        tool_calls,
    })
}

/// Load a session's records in append order.
///
/// With `limit`, only the most recent `limit` records are returned (still
/// oldest first).
pub async fn load_records(
    db: &Database,
    key: &SessionKey,
    limit: Option<usize>,
) -> Result<Vec<SessionRecord>, SkiffError> {
    let key = key.as_str().to_string();
    let limit = limit.map(|l| l as i64).unwrap_or(-1);
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT role, content, tool_call_id, tool_name, tool_calls, created_at
                 FROM (
                     SELECT * FROM session_records WHERE session_key = ?1
                     ORDER BY id DESC LIMIT ?2
                 ) ORDER BY id ASC",
            )?;
            let rows = stmt.query_map(params![key, limit], record_from_row)?;
            rows.collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(map_tr_err)
}

/// User message counter, or 0 for an unknown session.
pub async fn user_message_count(db: &Database, key: &SessionKey) -> Result<u64, SkiffError> {
    let key = key.as_str().to_string();
    db.connection()
        .call(move |conn| {
            let count: Option<i64> = conn
                .query_row(
                    "SELECT user_message_count FROM sessions WHERE session_key = ?1",
                    params![key],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(count.unwrap_or(0) as u64)
        })
        .await
        .map_err(map_tr_err)
}

/// Reset the user message counter. Unknown sessions are left alone.
pub async fn reset_user_message_count(db: &Database, key: &SessionKey) -> Result<(), SkiffError> {
    let key = key.as_str().to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE sessions SET user_message_count = 0,
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE session_key = ?1",
                params![key],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// All session keys, most recently updated first.
pub async fn list_session_keys(db: &Database) -> Result<Vec<SessionKey>, SkiffError> {
    db.connection()
        .call(|conn| {
            let mut stmt =
                conn.prepare("SELECT session_key FROM sessions ORDER BY updated_at DESC")?;
            let rows = stmt.query_map([], |row| row.get::<_, String>(0).map(SessionKey::from))?;
            rows.collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(map_tr_err)
}

/// Summary of one session, if it exists.
pub async fn get_summary(
    db: &Database,
    key: &SessionKey,
) -> Result<Option<SessionSummary>, SkiffError> {
    let key = key.as_str().to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                "SELECT s.session_key, s.user_message_count,
                        (SELECT COUNT(*) FROM session_records r WHERE r.session_key = s.session_key),
                        s.created_at, s.updated_at
                 FROM sessions s WHERE s.session_key = ?1",
                params![key],
                |row| {
                    Ok(SessionSummary {
                        key: SessionKey::from(row.get::<_, String>(0)?),
                        user_message_count: row.get::<_, i64>(1)? as u64,
                        record_count: row.get::<_, i64>(2)? as u64,
                        created_at: row.get(3)?,
                        updated_at: row.get(4)?,
                    })
                },
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use skiff_core::{ToolErrorKind, ToolResult};

    #[tokio::test]
    async fn user_counter_tracks_user_appends_only() {
        let db = Database::open_in_memory().await.unwrap();
        let key = SessionKey::new("cli", "direct");

        for i in 0..3 {
            let n = append_record(&db, &key, &SessionRecord::user(format!("q{i}")))
                .await
                .unwrap();
            assert_eq!(n, i + 1);
            append_record(&db, &key, &SessionRecord::assistant("a", vec![]))
                .await
                .unwrap();
        }
        assert_eq!(user_message_count(&db, &key).await.unwrap(), 3);

        reset_user_message_count(&db, &key).await.unwrap();
        assert_eq!(user_message_count(&db, &key).await.unwrap(), 0);
        let n = append_record(&db, &key, &SessionRecord::user("again")).await.unwrap();
        assert_eq!(n, 1);
    }

    #[tokio::test]
    async fn records_round_trip_with_tool_metadata() {
        let db = Database::open_in_memory().await.unwrap();
        let key = SessionKey::new("telegram", "42");
        let call = ToolCall {
            id: "c1".into(),
            name: "echo".into(),
            arguments: serde_json::json!({"text": "hi"}),
        };
        append_record(&db, &key, &SessionRecord::user("hello")).await.unwrap();
        append_record(&db, &key, &SessionRecord::assistant("", vec![call.clone()]))
            .await
            .unwrap();
        let result = ToolResult::failed(&call, ToolErrorKind::Timeout, "timed out");
        append_record(&db, &key, &SessionRecord::tool(&result)).await.unwrap();

        let records = load_records(&db, &key, None).await.unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].role, Role::User);
        assert_eq!(records[1].tool_calls, vec![call]);
        assert_eq!(records[2].tool_call_id.as_deref(), Some("c1"));
        assert_eq!(records[2].tool_name.as_deref(), Some("echo"));
    }

    #[tokio::test]
    async fn limited_load_keeps_most_recent_in_order() {
        let db = Database::open_in_memory().await.unwrap();
        let key = SessionKey::new("cli", "direct");
        for i in 0..10 {
            append_record(&db, &key, &SessionRecord::user(i.to_string()))
                .await
                .unwrap();
        }
        let tail = load_records(&db, &key, Some(3)).await.unwrap();
        let contents: Vec<_> = tail.iter().map(|r| r.content.as_str()).collect();
        assert_eq!(contents, vec!["7", "8", "9"]);
    }

    #[tokio::test]
    async fn unknown_session_reads_as_empty() {
        let db = Database::open_in_memory().await.unwrap();
        let key = SessionKey::new("nowhere", "0");
        assert!(load_records(&db, &key, None).await.unwrap().is_empty());
        assert_eq!(user_message_count(&db, &key).await.unwrap(), 0);
        assert!(get_summary(&db, &key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn summary_counts_records() {
        let db = Database::open_in_memory().await.unwrap();
        let key = SessionKey::new("cli", "direct");
        append_record(&db, &key, &SessionRecord::user("a")).await.unwrap();
        append_record(&db, &key, &SessionRecord::assistant("b", vec![]))
            .await
            .unwrap();
        let summary = get_summary(&db, &key).await.unwrap().unwrap();
        assert_eq!(summary.user_message_count, 1);
        assert_eq!(summary.record_count, 2);
        assert_eq!(list_session_keys(&db).await.unwrap(), vec![key]);
    }
}
