use anyhow::{Context, Result};
use rusqlite::Connection;
use tracing::{info, warn};

use crate::cli::StatusArgs;
use crate::config::{
    DB_FILE_NAME, INGEST_MANIFEST_PREFIX, INVENTORY_MANIFEST_NAME, MANIFEST_DIR_NAME,
};
use crate::index::count_rows;
use crate::model::{IngestRunManifest, InventoryManifest};
use crate::util::{latest_manifest, read_json};

pub fn run(args: StatusArgs) -> Result<()> {
    let manifest_dir = args.cache_root.join(MANIFEST_DIR_NAME);
    let inventory_path = manifest_dir.join(INVENTORY_MANIFEST_NAME);
    let db_path = args
        .db_path
        .unwrap_or_else(|| args.cache_root.join(DB_FILE_NAME));

    info!(cache_root = %args.cache_root.display(), "status requested");

    match latest_manifest(&manifest_dir, INGEST_MANIFEST_PREFIX)? {
        Some(path) => {
            let run: IngestRunManifest = read_json(&path)?;
            info!(
                path = %path.display(),
                run_id = %run.run_id,
                status = %run.status,
                started_at = %run.started_at,
                updated_at = %run.updated_at,
                corpus = %run.paths.corpus_dir,
                io_threads = run.settings.io_threads,
                files = run.counts.files_seen,
                failed_files = run.counts.files_failed,
                records_indexed = run.counts.records_indexed,
                records_dropped = run.counts.records_dropped,
                failure_reason = %run.failure_reason.unwrap_or_default(),
                "loaded latest ingest manifest"
            );
            for failure in &run.failed_files {
                warn!(
                    path = %failure.path,
                    records = failure.records_before_failure,
                    error = %failure.error,
                    "file failed during last ingest"
                );
            }
        }
        None => warn!(dir = %manifest_dir.display(), "no ingest run manifest found"),
    }

    if inventory_path.exists() {
        let inventory: InventoryManifest = read_json(&inventory_path)?;
        info!(
            generated_at = %inventory.generated_at,
            groups = inventory.group_count,
            files = inventory.file_count,
            bytes = inventory.total_bytes,
            "loaded inventory manifest"
        );
    } else {
        warn!(path = %inventory_path.display(), "inventory manifest missing");
    }

    if db_path.exists() {
        let conn = Connection::open(&db_path)
            .with_context(|| format!("failed to open {}", db_path.display()))?;
        let records = count_rows(&conn, "SELECT COUNT(*) FROM records").unwrap_or(0);
        let fields = count_rows(&conn, "SELECT COUNT(*) FROM record_fields").unwrap_or(0);
        let schema_version: String = conn
            .query_row(
                "SELECT value FROM metadata WHERE key = 'db_schema_version'",
                [],
                |row| row.get(0),
            )
            .unwrap_or_default();

        info!(
            path = %db_path.display(),
            schema_version = %schema_version,
            records,
            fields,
            "database status"
        );
    } else {
        warn!(path = %db_path.display(), "database file missing");
    }

    Ok(())
}
