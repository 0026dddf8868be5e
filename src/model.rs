use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryFile {
    pub path: String,
    pub size_bytes: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryGroup {
    pub dir: String,
    pub file_count: usize,
    pub files: Vec<InventoryFile>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryManifest {
    pub manifest_version: u32,
    pub generated_at: String,
    pub corpus_dir: String,
    pub group_prefix: String,
    pub group_count: usize,
    pub file_count: usize,
    pub total_bytes: u64,
    pub groups: Vec<InventoryGroup>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileFailure {
    pub path: String,
    pub records_before_failure: usize,
    pub error: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestSettings {
    pub io_threads: usize,
    pub queue_capacity: usize,
    pub batch_size: usize,
    pub group_prefix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestPaths {
    pub cache_root: String,
    pub corpus_dir: String,
    pub manifest_dir: String,
    pub db_path: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestCounts {
    pub groups_completed: usize,
    pub files_seen: usize,
    pub files_ok: usize,
    pub files_failed: usize,
    pub records_emitted: usize,
    pub records_indexed: usize,
    pub records_dropped: usize,
    pub records_failed: usize,
    pub records_total: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestRunManifest {
    pub manifest_version: u32,
    pub run_id: String,
    pub db_schema_version: String,
    pub status: String,
    pub started_at: String,
    pub updated_at: String,
    pub failure_reason: Option<String>,
    pub command: String,
    pub settings: IngestSettings,
    pub paths: IngestPaths,
    pub counts: IngestCounts,
    pub failed_files: Vec<FileFailure>,
    pub warnings: Vec<String>,
}
