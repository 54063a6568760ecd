// SPDX-FileCopyrightText: 2026 Skiff Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `skiff session` subcommands.

use std::fmt::Write as _;
use std::sync::Arc;

use clap::Subcommand;
use skiff_core::{SessionKey, SkiffError, StorageAdapter};

#[derive(Subcommand, Debug, Clone)]
pub enum SessionCommand {
    /// List known sessions with their user message counts.
    List,
    /// Print a session transcript.
    Show {
        /// Session key, `channel:chat_id`.
        key: String,
        /// Only the last N records.
        #[arg(long, short = 'n')]
        limit: Option<usize>,
    },
    /// Reset a session's user message counter. The transcript is kept.
    ResetCount { key: String },
}

const PREVIEW_CHARS: usize = 200;

fn preview(content: &str) -> String {
    let mut chars = content.chars();
    let head: String = chars.by_ref().take(PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}

impl SessionCommand {
    pub async fn run(self, storage: Arc<dyn StorageAdapter>) -> Result<String, SkiffError> {
        let mut out = String::new();
        match self {
            Self::List => {
                let keys = storage.list_session_keys().await?;
                if keys.is_empty() {
                    return Ok("No sessions.\n".to_string());
                }
                for key in keys {
                    let count = storage.user_message_count(&key).await?;
                    let _ = writeln!(out, "{key:<40} {count} user messages");
                }
            }
            Self::Show { key, limit } => {
                let key = SessionKey::from(key);
                let records = storage.load_records(&key).await?;
                if records.is_empty() {
                    return Err(SkiffError::Validation(format!("no session '{key}'")));
                }
                let skip = limit.map_or(0, |n| records.len().saturating_sub(n));
                for record in &records[skip..] {
                    let _ = write!(
                        out,
                        "[{}] {}",
                        record.timestamp.format("%Y-%m-%d %H:%M:%S"),
                        record.role
                    );
                    if let Some(tool) = &record.tool_name {
                        let _ = write!(out, " ({tool})");
                    }
                    let _ = writeln!(out, ": {}", preview(&record.content));
                    for call in &record.tool_calls {
                        let _ = writeln!(out, "    -> {}({})", call.name, call.arguments);
                    }
                }
            }
            Self::ResetCount { key } => {
                let key = SessionKey::from(key);
                storage.reset_user_message_count(&key).await?;
                let _ = writeln!(out, "Reset user message count for {key}");
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_content_is_truncated() {
        let long = "x".repeat(PREVIEW_CHARS + 5);
        assert!(preview(&long).ends_with("..."));
        assert_eq!(preview("short"), "short");
    }
}
