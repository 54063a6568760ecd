// SPDX-FileCopyrightText: 2026 Skiff Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence layer for the Skiff runtime.
//!
//! Provides WAL-mode SQLite storage with embedded migrations, a single-writer
//! concurrency model via `tokio-rusqlite`, an append-only session log with a
//! per-session user message counter, and one-document-per-job cron storage.

pub mod adapter;
pub mod database;
pub mod migrations;
pub mod models;
pub mod queries;

pub use adapter::SqliteStorage;
pub use database::Database;
pub use models::SessionSummary;
