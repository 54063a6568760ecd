// SPDX-FileCopyrightText: 2026 Skiff Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Row types for storage entities that have no core counterpart.

use chrono::{DateTime, Utc};
use serde::Serialize;
use skiff_core::SessionKey;

/// Summary row of the `sessions` table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSummary {
    pub key: SessionKey,
    pub user_message_count: u64,
    pub record_count: u64,
    pub created_at: String,
    pub updated_at: String,
}

/// Timestamp format used for every `*_at` column.
pub(crate) fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

pub(crate) fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(s).map(|dt| dt.with_timezone(&Utc))
}
