use anyhow::{Context, Result};
use rusqlite::Connection;

use crate::util::now_utc_string;

pub const DB_SCHEMA_VERSION: &str = "1.0.0";

pub(super) fn configure_connection(connection: &Connection) -> Result<()> {
    connection
        .pragma_update(None, "journal_mode", "WAL")
        .context("failed to set journal_mode=WAL")?;
    connection
        .pragma_update(None, "synchronous", "NORMAL")
        .context("failed to set synchronous=NORMAL")?;
    Ok(())
}

pub(super) fn ensure_schema(connection: &Connection) -> Result<()> {
    connection
        .execute_batch(
            "
            CREATE TABLE IF NOT EXISTS metadata (
              key TEXT PRIMARY KEY,
              value TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS records (
              pmid TEXT PRIMARY KEY,
              title TEXT,
              abstract TEXT,
              date_day INTEGER,
              fields_json TEXT NOT NULL,
              updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS record_fields (
              pmid TEXT NOT NULL,
              seq INTEGER NOT NULL,
              tag TEXT NOT NULL,
              value TEXT NOT NULL,
              PRIMARY KEY (pmid, seq),
              FOREIGN KEY (pmid) REFERENCES records(pmid) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_record_fields_tag ON record_fields(tag, value);
            CREATE INDEX IF NOT EXISTS idx_records_date_day ON records(date_day);
            ",
        )
        .context("failed to create record tables")?;

    connection
        .execute(
            "
            CREATE VIRTUAL TABLE IF NOT EXISTS records_fts
            USING fts5(pmid UNINDEXED, title, abstract, mesh, body)
            ",
            [],
        )
        .context("failed to initialize FTS5 table records_fts")?;

    set_metadata(connection, "db_schema_version", DB_SCHEMA_VERSION)?;
    set_metadata(connection, "db_updated_at", &now_utc_string())?;

    Ok(())
}

pub(super) fn set_metadata(connection: &Connection, key: &str, value: &str) -> Result<()> {
    connection
        .execute(
            "INSERT INTO metadata(key, value) VALUES(?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value=excluded.value",
            [key, value],
        )
        .with_context(|| format!("failed to write metadata key {key}"))?;
    Ok(())
}
