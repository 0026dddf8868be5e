use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::corpus::DEFAULT_GROUP_PREFIX;

#[derive(Parser, Debug)]
#[command(
    name = "medline",
    version,
    about = "Parse MEDLINE flat-file corpora into a local full-text index"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Walk a corpus and record its groups and files.
    Inventory(InventoryArgs),
    /// Parse every corpus file and upsert the records into the index.
    Ingest(IngestArgs),
    /// Parse one file and print its records.
    Parse(ParseArgs),
    /// Summarize manifests and index contents.
    Status(StatusArgs),
}

#[derive(Args, Debug, Clone)]
pub struct InventoryArgs {
    #[arg(long)]
    pub corpus_dir: PathBuf,

    #[arg(long, default_value = ".cache/medline")]
    pub cache_root: PathBuf,

    #[arg(long)]
    pub manifest_path: Option<PathBuf>,

    #[arg(long, default_value = DEFAULT_GROUP_PREFIX)]
    pub group_prefix: String,

    #[arg(long, default_value_t = false)]
    pub hash: bool,

    #[arg(long, default_value_t = false)]
    pub dry_run: bool,
}

#[derive(Args, Debug, Clone)]
pub struct IngestArgs {
    #[arg(long, env = "MEDLINE_CORPUS_DIR")]
    pub corpus_dir: PathBuf,

    #[arg(long, default_value = ".cache/medline")]
    pub cache_root: PathBuf,

    #[arg(long)]
    pub db_path: Option<PathBuf>,

    #[arg(long)]
    pub ingest_manifest_path: Option<PathBuf>,

    #[arg(long, env = "MEDLINE_IO_THREADS", default_value_t = 1)]
    pub io_threads: usize,

    #[arg(long, default_value_t = 1024)]
    pub queue_capacity: usize,

    #[arg(long, default_value_t = 500)]
    pub batch_size: usize,

    #[arg(long, default_value = DEFAULT_GROUP_PREFIX)]
    pub group_prefix: String,
}

#[derive(Args, Debug, Clone)]
pub struct ParseArgs {
    /// A MEDLINE file, or a corpus root whose files are parsed in walk order.
    pub path: PathBuf,

    #[arg(long, default_value_t = false)]
    pub json: bool,

    /// Keep administrative tags that ingest normally discards.
    #[arg(long, default_value_t = false)]
    pub keep_ignored: bool,

    #[arg(long, default_value = DEFAULT_GROUP_PREFIX)]
    pub group_prefix: String,
}

#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    #[arg(long, default_value = ".cache/medline")]
    pub cache_root: PathBuf,

    #[arg(long)]
    pub db_path: Option<PathBuf>,
}
