//! SQLite store for parsed records, keyed by PMID, with an FTS5 mirror of
//! the searchable text.

use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::{Connection, Transaction, params};
use serde::Serialize;
use tracing::info;

use crate::medline::Record;
use crate::medline::tags::{ABSTRACT, DATE_DAY, MESH_HEADING, PMID, TITLE};
use crate::util::now_utc_string;

mod consumer;
mod db_setup;

pub use consumer::{ConsumeStats, IndexConsumer};
pub use db_setup::DB_SCHEMA_VERSION;

use db_setup::{configure_connection, ensure_schema, set_metadata};

#[derive(Debug, Clone, Default, Serialize)]
pub struct IndexCounts {
    pub records: i64,
    pub fields: i64,
    pub fts_rows: i64,
}

pub struct RecordIndex {
    connection: Connection,
}

impl RecordIndex {
    pub fn open(path: &Path) -> Result<Self> {
        let connection = Connection::open(path)
            .with_context(|| format!("failed to open {}", path.display()))?;
        configure_connection(&connection)?;
        ensure_schema(&connection)?;
        Ok(Self { connection })
    }

    /// Starts one write transaction covering a batch of upserts.
    pub fn begin_batch(&mut self) -> Result<IndexBatch<'_>> {
        let tx = self
            .connection
            .transaction()
            .context("failed to begin index batch")?;
        Ok(IndexBatch {
            tx,
            updated_at: now_utc_string(),
        })
    }

    pub fn counts(&self) -> Result<IndexCounts> {
        Ok(IndexCounts {
            records: count_rows(&self.connection, "SELECT COUNT(*) FROM records")?,
            fields: count_rows(&self.connection, "SELECT COUNT(*) FROM record_fields")?,
            fts_rows: count_rows(&self.connection, "SELECT COUNT(*) FROM records_fts")?,
        })
    }

    /// Merges FTS segments after a bulk load and stamps the run time.
    pub fn optimize(&self) -> Result<()> {
        self.connection
            .execute("INSERT INTO records_fts(records_fts) VALUES('optimize')", [])
            .context("failed to optimize records_fts")?;
        set_metadata(&self.connection, "last_ingest_at", &now_utc_string())?;
        info!("optimized full-text index");
        Ok(())
    }
}

/// Upserts sharing one transaction. Each record is written under its own
/// savepoint, so a failing record rolls back alone.
pub struct IndexBatch<'c> {
    tx: Transaction<'c>,
    updated_at: String,
}

impl IndexBatch<'_> {
    /// Replaces whatever is stored under `pmid` with `record`.
    pub fn upsert(&mut self, pmid: &str, record: &Record) -> rusqlite::Result<()> {
        let savepoint = self.tx.savepoint()?;
        upsert_record(&savepoint, pmid, record, &self.updated_at)?;
        savepoint.commit()
    }

    pub fn commit(self) -> Result<()> {
        self.tx.commit().context("failed to commit index batch")
    }
}

pub fn count_rows(connection: &Connection, sql: &str) -> Result<i64> {
    let count = connection
        .query_row(sql, [], |row| row.get(0))
        .with_context(|| format!("failed to count rows: {sql}"))?;
    Ok(count)
}

/// Delete-then-insert of one record across the three record tables.
fn upsert_record(
    connection: &Connection,
    pmid: &str,
    record: &Record,
    updated_at: &str,
) -> rusqlite::Result<()> {
    connection
        .prepare_cached("DELETE FROM records_fts WHERE pmid = ?1")?
        .execute([pmid])?;
    connection
        .prepare_cached("DELETE FROM record_fields WHERE pmid = ?1")?
        .execute([pmid])?;
    connection
        .prepare_cached("DELETE FROM records WHERE pmid = ?1")?
        .execute([pmid])?;

    let fields_json = serde_json::to_string(record)
        .map_err(|err| rusqlite::Error::ToSqlConversionFailure(Box::new(err)))?;
    let date_day = record
        .get(DATE_DAY)
        .and_then(|value| value.parse::<i64>().ok());

    connection
        .prepare_cached(
            "INSERT INTO records(pmid, title, abstract, date_day, fields_json, updated_at)
             VALUES(?1, ?2, ?3, ?4, ?5, ?6)",
        )?
        .execute(params![
            pmid,
            record.get(TITLE),
            record.get(ABSTRACT),
            date_day,
            fields_json,
            updated_at
        ])?;

    {
        let mut insert_field = connection.prepare_cached(
            "INSERT INTO record_fields(pmid, seq, tag, value) VALUES(?1, ?2, ?3, ?4)",
        )?;
        for (seq, field) in record.fields().iter().enumerate() {
            insert_field.execute(params![pmid, seq as i64, field.tag.as_str(), &field.value])?;
        }
    }

    let text = SearchText::from_record(record);
    connection
        .prepare_cached(
            "INSERT INTO records_fts(pmid, title, abstract, mesh, body) VALUES(?1, ?2, ?3, ?4, ?5)",
        )?
        .execute(params![pmid, text.title, text.abstract_text, text.mesh, text.body])?;

    Ok(())
}

#[derive(Debug, Default, PartialEq)]
struct SearchText {
    title: String,
    abstract_text: String,
    mesh: String,
    body: String,
}

impl SearchText {
    fn from_record(record: &Record) -> Self {
        let mut text = Self::default();
        for field in record.fields() {
            if field.tag.is_derived() || field.tag == *PMID {
                continue;
            }
            let target = match field.tag.as_str() {
                TITLE => &mut text.title,
                ABSTRACT => &mut text.abstract_text,
                MESH_HEADING => &mut text.mesh,
                _ => &mut text.body,
            };
            if !target.is_empty() {
                target.push('\n');
            }
            target.push_str(&field.value);
        }
        text
    }
}
