//! Relational schema for the ledger store
//!
//! Dates are stored as ISO calendar-day text so the snapshot ORDER BY is
//! chronological; amounts are stored as integer cents so the update join
//! matches exactly.

use rusqlite::Connection;

use crate::error::TallyResult;

/// Date rendering used for all TEXT date columns
pub(crate) const DB_DATE_FORMAT: &str = "%Y-%m-%d";

/// Create any missing tables on a freshly materialized database
pub(crate) fn ensure(conn: &Connection) -> TallyResult<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS tx (
            source TEXT NOT NULL,
            date TEXT NOT NULL,
            memo TEXT NOT NULL,
            amount INTEGER NOT NULL,
            disambiguation TEXT NOT NULL,
            category TEXT NOT NULL,
            ignored INTEGER NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS investment (
            account INTEGER NOT NULL,
            date TEXT NOT NULL,
            kind TEXT NOT NULL,
            symbol TEXT NOT NULL,
            shares REAL NOT NULL,
            price REAL NOT NULL,
            disambiguation TEXT NOT NULL
        )",
        [],
    )?;

    // Daily journal entries; collaborator feature sharing the store lifecycle
    conn.execute(
        "CREATE TABLE IF NOT EXISTS journal (
            date TEXT PRIMARY KEY,
            entry TEXT NOT NULL
        )",
        [],
    )?;

    Ok(())
}
