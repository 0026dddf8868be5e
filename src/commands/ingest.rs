use std::sync::Arc;
use std::thread;

use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use crossbeam::channel;
use tracing::{info, warn};

use crate::cli::IngestArgs;
use crate::config::IngestConfig;
use crate::corpus::Corpus;
use crate::index::{ConsumeStats, DB_SCHEMA_VERSION, IndexConsumer, RecordIndex};
use crate::medline::{Record, RecordParser, RecordPool};
use crate::model::{IngestCounts, IngestPaths, IngestRunManifest, IngestSettings};
use crate::pipeline::{IngestionPipeline, Interrupt, PipelineError, PipelineStats};
use crate::util::{ensure_directory, now_utc_string, utc_compact_string, write_json_pretty};

pub fn run(args: IngestArgs) -> Result<()> {
    let started_ts = Utc::now();
    let started_at = now_utc_string();
    let run_id = format!("run-{}", utc_compact_string(started_ts));

    let config = IngestConfig::from_args(&args, started_ts)?;
    let corpus = Corpus::open(&config.corpus_dir)
        .context("corpus directory failed validation")?
        .with_group_prefix(config.group_prefix.clone());

    ensure_directory(&config.manifest_dir)?;
    if let Some(parent) = config.db_path.parent() {
        ensure_directory(parent)?;
    }

    info!(
        run_id = %run_id,
        corpus = %corpus.root().display(),
        db = %config.db_path.display(),
        io_threads = config.io_threads,
        "starting ingest"
    );

    let mut index = RecordIndex::open(&config.db_path)?;
    let pool = Arc::new(RecordPool::new(config.pool_capacity()));
    let parser = RecordParser::new(Arc::clone(&pool))?;

    let interrupt = Interrupt::new();
    let handler_interrupt = interrupt.clone();
    ctrlc::set_handler(move || {
        warn!("interrupt received; finishing in-flight group");
        handler_interrupt.trigger();
    })
    .context("failed to install Ctrl-C handler")?;

    let pipeline = IngestionPipeline::new(&parser, config.io_threads).with_interrupt(interrupt);
    let (outcome, consumed) = run_pipeline(&pipeline, &corpus, &mut index, &pool, &config)?;

    let mut warnings = Vec::new();
    let (consume_stats, consumer_error) = match consumed {
        Ok(stats) => (stats, None),
        Err(err) => {
            warnings.push(format!("index consumer stopped early: {err:#}"));
            (ConsumeStats::default(), Some(err))
        }
    };

    let (status, failure_reason, pipeline_stats) = match (&outcome, &consumer_error) {
        (Ok(stats), None) => ("completed", None, stats.clone()),
        (Ok(stats), Some(err)) => ("failed", Some(format!("{err:#}")), stats.clone()),
        (Err(err), _) => (
            match err {
                PipelineError::Interrupted { .. } => "interrupted",
                _ => "failed",
            },
            Some(err.to_string()),
            err.stats().cloned().unwrap_or_default(),
        ),
    };

    if status == "completed" {
        index.optimize()?;
    }
    let records_total = index.counts()?.records;

    let manifest = IngestRunManifest {
        manifest_version: 1,
        run_id: run_id.clone(),
        db_schema_version: DB_SCHEMA_VERSION.to_string(),
        status: status.to_string(),
        started_at,
        updated_at: now_utc_string(),
        failure_reason,
        command: render_ingest_command(&config),
        settings: IngestSettings {
            io_threads: config.io_threads,
            queue_capacity: config.queue_capacity,
            batch_size: config.batch_size,
            group_prefix: config.group_prefix.clone(),
        },
        paths: IngestPaths {
            cache_root: config.cache_root.display().to_string(),
            corpus_dir: corpus.root().display().to_string(),
            manifest_dir: config.manifest_dir.display().to_string(),
            db_path: config.db_path.display().to_string(),
        },
        counts: IngestCounts {
            groups_completed: pipeline_stats.groups_completed,
            files_seen: pipeline_stats.files_seen,
            files_ok: pipeline_stats.files_ok,
            files_failed: pipeline_stats.files_failed,
            records_emitted: pipeline_stats.records_emitted,
            records_indexed: consume_stats.indexed,
            records_dropped: consume_stats.dropped,
            records_failed: consume_stats.failed,
            records_total,
        },
        failed_files: pipeline_stats.failures,
        warnings,
    };

    write_json_pretty(&config.ingest_manifest_path, &manifest)?;
    info!(path = %config.ingest_manifest_path.display(), "wrote ingest run manifest");

    outcome.with_context(|| format!("ingest run {run_id} did not complete"))?;
    if let Some(err) = consumer_error {
        return Err(err.context(format!("ingest run {run_id} failed while indexing")));
    }

    info!(
        records = manifest.counts.records_indexed,
        failed_files = manifest.counts.files_failed,
        total = records_total,
        pooled = pool.available(),
        "ingest completed"
    );
    Ok(())
}

type ConsumerOutcome = Result<ConsumeStats>;

/// Runs the parse workers on this thread's scope and the index consumer on
/// its own thread, joined by a bounded channel.
fn run_pipeline(
    pipeline: &IngestionPipeline<'_>,
    corpus: &Corpus,
    index: &mut RecordIndex,
    pool: &Arc<RecordPool>,
    config: &IngestConfig,
) -> Result<(Result<PipelineStats, PipelineError>, ConsumerOutcome)> {
    let (sender, receiver) = channel::bounded::<Record>(config.queue_capacity);

    thread::scope(|scope| {
        let consumer_pool = Arc::clone(pool);
        let batch_size = config.batch_size;
        let consumer = thread::Builder::new()
            .name("medline-index".to_string())
            .spawn_scoped(scope, move || {
                IndexConsumer::new(index, consumer_pool, batch_size).consume(&receiver)
            })
            .context("failed to spawn index consumer")?;

        let outcome = pipeline.run(corpus, &sender);
        drop(sender);

        let consumed = consumer
            .join()
            .map_err(|_| anyhow!("index consumer panicked"))?;
        Ok((outcome, consumed))
    })
}

fn render_ingest_command(config: &IngestConfig) -> String {
    format!(
        "medline ingest --corpus-dir {} --cache-root {} --db-path {} --io-threads {} --queue-capacity {} --batch-size {} --group-prefix {}",
        config.corpus_dir.display(),
        config.cache_root.display(),
        config.db_path.display(),
        config.io_threads,
        config.queue_capacity,
        config.batch_size,
        config.group_prefix,
    )
}
