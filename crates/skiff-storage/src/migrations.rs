// SPDX-FileCopyrightText: 2026 Skiff Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Schema migrations, embedded from `migrations/` at build time and applied
//! every time a database is opened.

mod embedded {
    use refinery::embed_migrations;
    embed_migrations!("migrations");
}

/// Brings `conn` up to the latest schema. Already-applied versions are skipped.
pub fn run_migrations(conn: &mut rusqlite::Connection) -> Result<(), refinery::Error> {
    let report = embedded::migrations::runner().run(conn)?;
    for migration in report.applied_migrations() {
        tracing::debug!(migration = %migration, "applied migration");
    }
    Ok(())
}
