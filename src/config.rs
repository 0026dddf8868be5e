use std::path::PathBuf;

use anyhow::{Result, bail};
use chrono::{DateTime, Utc};

use crate::cli::IngestArgs;
use crate::util::utc_compact_string;

pub const DB_FILE_NAME: &str = "medline_index.sqlite";
pub const MANIFEST_DIR_NAME: &str = "manifests";
pub const INVENTORY_MANIFEST_NAME: &str = "corpus_inventory.json";
pub const INGEST_MANIFEST_PREFIX: &str = "ingest_run_";

/// Resolved and validated settings for one ingest run.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub corpus_dir: PathBuf,
    pub cache_root: PathBuf,
    pub manifest_dir: PathBuf,
    pub db_path: PathBuf,
    pub ingest_manifest_path: PathBuf,
    pub io_threads: usize,
    pub queue_capacity: usize,
    pub batch_size: usize,
    pub group_prefix: String,
}

impl IngestConfig {
    pub fn from_args(args: &IngestArgs, started: DateTime<Utc>) -> Result<Self> {
        if args.io_threads == 0 {
            bail!("--io-threads must be at least 1");
        }
        if args.queue_capacity == 0 {
            bail!("--queue-capacity must be at least 1");
        }
        if args.batch_size == 0 {
            bail!("--batch-size must be at least 1");
        }
        if args.group_prefix.is_empty() {
            bail!("--group-prefix must not be empty");
        }

        let cache_root = args.cache_root.clone();
        let manifest_dir = cache_root.join(MANIFEST_DIR_NAME);
        let db_path = args
            .db_path
            .clone()
            .unwrap_or_else(|| cache_root.join(DB_FILE_NAME));
        let ingest_manifest_path = args.ingest_manifest_path.clone().unwrap_or_else(|| {
            manifest_dir.join(format!(
                "{INGEST_MANIFEST_PREFIX}{}.json",
                utc_compact_string(started)
            ))
        });

        Ok(Self {
            corpus_dir: args.corpus_dir.clone(),
            cache_root,
            manifest_dir,
            db_path,
            ingest_manifest_path,
            io_threads: args.io_threads,
            queue_capacity: args.queue_capacity,
            batch_size: args.batch_size,
            group_prefix: args.group_prefix.clone(),
        })
    }

    /// Records that may be alive at once: queued, in flight on each worker,
    /// and one batch held by the consumer.
    pub fn pool_capacity(&self) -> usize {
        self.queue_capacity + self.io_threads + self.batch_size
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn args() -> IngestArgs {
        IngestArgs {
            corpus_dir: PathBuf::from("/data/medline"),
            cache_root: PathBuf::from(".cache/medline"),
            db_path: None,
            ingest_manifest_path: None,
            io_threads: 1,
            queue_capacity: 1024,
            batch_size: 500,
            group_prefix: "cits_".to_string(),
        }
    }

    fn started() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 6, 7, 8, 9)
            .single()
            .expect("valid timestamp")
    }

    #[test]
    fn defaults_resolve_under_cache_root() {
        let config = IngestConfig::from_args(&args(), started()).expect("valid config");

        assert_eq!(config.db_path, PathBuf::from(".cache/medline/medline_index.sqlite"));
        assert_eq!(config.manifest_dir, PathBuf::from(".cache/medline/manifests"));
        assert_eq!(
            config.ingest_manifest_path,
            PathBuf::from(".cache/medline/manifests/ingest_run_20240506T070809Z.json")
        );
        assert_eq!(config.pool_capacity(), 1525);
    }

    #[test]
    fn explicit_paths_win() {
        let mut args = args();
        args.db_path = Some(PathBuf::from("/tmp/index.sqlite"));
        args.ingest_manifest_path = Some(PathBuf::from("/tmp/run.json"));

        let config = IngestConfig::from_args(&args, started()).expect("valid config");
        assert_eq!(config.db_path, PathBuf::from("/tmp/index.sqlite"));
        assert_eq!(config.ingest_manifest_path, PathBuf::from("/tmp/run.json"));
    }

    #[test]
    fn zero_sizes_are_rejected() {
        let mutations: [fn(&mut IngestArgs); 4] = [
            |args| args.io_threads = 0,
            |args| args.queue_capacity = 0,
            |args| args.batch_size = 0,
            |args| args.group_prefix.clear(),
        ];
        for mutate in mutations {
            let mut args = args();
            mutate(&mut args);
            assert!(IngestConfig::from_args(&args, started()).is_err());
        }
    }
}
