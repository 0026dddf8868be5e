use std::any::Any;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use crossbeam::channel::{self, Receiver, Sender};
use crossbeam::sync::WaitGroup;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::corpus::{Corpus, CorpusError, CorpusFile, CorpusGroups};
use crate::medline::{ParseError, Record, RecordParser};
use crate::model::FileFailure;

#[derive(Debug, Error)]
#[error("record sink is closed")]
pub struct SinkError;

/// Handoff point between parse workers and the downstream consumer.
pub trait RecordSink: Sync {
    /// May block while the consumer applies backpressure.
    fn put(&self, record: Record) -> Result<(), SinkError>;
}

impl RecordSink for Sender<Record> {
    fn put(&self, record: Record) -> Result<(), SinkError> {
        self.send(record).map_err(|_| SinkError)
    }
}

/// Process-wide stop request, honoured between groups.
#[derive(Debug, Clone, Default)]
pub struct Interrupt(Arc<AtomicBool>);

impl Interrupt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PipelineStats {
    pub groups_completed: usize,
    pub files_seen: usize,
    pub files_ok: usize,
    pub files_failed: usize,
    pub records_emitted: usize,
    pub failures: Vec<FileFailure>,
}

impl PipelineStats {
    fn absorb(&mut self, report: FileReport) {
        self.records_emitted += report.records;
        match report.error {
            None => self.files_ok += 1,
            Some(error) => {
                self.files_failed += 1;
                self.failures.push(FileFailure {
                    path: report.path.display().to_string(),
                    records_before_failure: report.records,
                    error,
                });
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("ingestion interrupted after {} groups", .stats.groups_completed)]
    Interrupted { stats: PipelineStats },

    #[error("record sink closed after {} groups", .stats.groups_completed)]
    Sink { stats: PipelineStats },

    #[error(transparent)]
    Corpus(#[from] CorpusError),

    #[error("failed to spawn parse worker: {0}")]
    Spawn(#[source] io::Error),
}

impl PipelineError {
    /// Progress made before the pipeline stopped, when any was made.
    pub fn stats(&self) -> Option<&PipelineStats> {
        match self {
            Self::Interrupted { stats } | Self::Sink { stats } => Some(stats),
            Self::Corpus(_) | Self::Spawn(_) => None,
        }
    }
}

#[derive(Debug, Error)]
enum FileError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Sink(#[from] SinkError),
}

struct FileJob {
    file: CorpusFile,
    _done: WaitGroup,
}

#[derive(Debug)]
struct FileReport {
    path: PathBuf,
    records: usize,
    error: Option<String>,
}

/// Parses corpus files on a fixed pool of worker threads, one level-2 group
/// at a time.
///
/// Every file of a group is scheduled, then the coordinator waits for the
/// whole group to finish before listing the next one. A file that fails to
/// open, read or parse contributes whatever records it produced before the
/// failure and never affects its siblings.
pub struct IngestionPipeline<'p> {
    parser: &'p RecordParser,
    io_threads: usize,
    interrupt: Interrupt,
}

impl<'p> IngestionPipeline<'p> {
    pub fn new(parser: &'p RecordParser, io_threads: usize) -> Self {
        Self {
            parser,
            io_threads: io_threads.max(1),
            interrupt: Interrupt::new(),
        }
    }

    pub fn with_interrupt(mut self, interrupt: Interrupt) -> Self {
        self.interrupt = interrupt;
        self
    }

    pub fn run<S: RecordSink>(
        &self,
        corpus: &Corpus,
        sink: &S,
    ) -> Result<PipelineStats, PipelineError> {
        let groups = corpus.groups()?;
        let sink_closed = AtomicBool::new(false);

        info!(
            corpus = %corpus.root().display(),
            io_threads = self.io_threads,
            "starting ingestion pipeline"
        );

        thread::scope(|scope| {
            let (job_tx, job_rx) = channel::bounded::<FileJob>(self.io_threads);
            let (report_tx, report_rx) = channel::unbounded::<FileReport>();

            for worker_idx in 0..self.io_threads {
                let jobs = job_rx.clone();
                let reports = report_tx.clone();
                let parser = self.parser;
                let sink_closed = &sink_closed;

                thread::Builder::new()
                    .name(format!("medline-io-{worker_idx}"))
                    .spawn_scoped(scope, move || {
                        for job in jobs.iter() {
                            let report = process_file(parser, &job.file, sink, sink_closed);
                            if reports.send(report).is_err() {
                                break;
                            }
                        }
                    })
                    .map_err(PipelineError::Spawn)?;
            }
            drop(job_rx);
            drop(report_tx);

            self.dispatch(groups, &job_tx, &report_rx, &sink_closed)
        })
    }

    fn dispatch(
        &self,
        groups: CorpusGroups<'_>,
        jobs: &Sender<FileJob>,
        reports: &Receiver<FileReport>,
        sink_closed: &AtomicBool,
    ) -> Result<PipelineStats, PipelineError> {
        let mut stats = PipelineStats::default();

        for group in groups {
            if self.interrupt.is_triggered() {
                warn!(
                    groups_completed = stats.groups_completed,
                    next_group = %group.dir.display(),
                    "interrupt received; stopping at group boundary"
                );
                return Err(PipelineError::Interrupted { stats });
            }

            debug!(group = %group.dir.display(), files = group.files.len(), "dispatching group");

            let barrier = WaitGroup::new();
            for file in group.files {
                stats.files_seen += 1;
                let job = FileJob {
                    file,
                    _done: barrier.clone(),
                };
                if jobs.send(job).is_err() {
                    error!(group = %group.dir.display(), "all parse workers exited");
                    break;
                }
            }
            barrier.wait();

            for report in reports.try_iter() {
                stats.absorb(report);
            }
            stats.groups_completed += 1;

            if sink_closed.load(Ordering::SeqCst) {
                error!(
                    group = %group.dir.display(),
                    "record sink closed; aborting ingestion"
                );
                return Err(PipelineError::Sink { stats });
            }
            if self.interrupt.is_triggered() {
                warn!(
                    groups_completed = stats.groups_completed,
                    group = %group.dir.display(),
                    "interrupt received; stopping after in-flight group"
                );
                return Err(PipelineError::Interrupted { stats });
            }
        }

        info!(
            groups = stats.groups_completed,
            files = stats.files_seen,
            failed_files = stats.files_failed,
            records = stats.records_emitted,
            "ingestion pipeline finished"
        );
        Ok(stats)
    }
}

fn process_file<S: RecordSink>(
    parser: &RecordParser,
    file: &CorpusFile,
    sink: &S,
    sink_closed: &AtomicBool,
) -> FileReport {
    let path = file.path();
    let mut records = 0;

    if sink_closed.load(Ordering::SeqCst) {
        return FileReport {
            path: path.to_path_buf(),
            records,
            error: Some(SinkError.to_string()),
        };
    }

    info!(path = %path.display(), "reading file");

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        parse_into_sink(parser, path, sink, &mut records)
    }));

    let error = match outcome {
        Ok(Ok(())) => None,
        Ok(Err(FileError::Sink(err))) => {
            sink_closed.store(true, Ordering::SeqCst);
            error!(path = %path.display(), records, error = %err, "record sink rejected record");
            Some(err.to_string())
        }
        Ok(Err(FileError::Parse(err))) => {
            error!(path = %path.display(), records, error = %err, "failed to parse file");
            Some(err.to_string())
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            error!(path = %path.display(), records, panic = %message, "parse worker panicked");
            Some(format!("panic: {message}"))
        }
    };

    FileReport {
        path: path.to_path_buf(),
        records,
        error,
    }
}

/// Early returns release the handle when `file` drops.
fn parse_into_sink<S: RecordSink>(
    parser: &RecordParser,
    path: &Path,
    sink: &S,
    records: &mut usize,
) -> Result<(), FileError> {
    let mut file = parser.open(path)?;
    for record in file.by_ref() {
        sink.put(record?)?;
        *records += 1;
    }
    file.close();
    Ok(())
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        return (*message).to_string();
    }
    if let Some(message) = payload.downcast_ref::<String>() {
        return message.clone();
    }
    "unknown panic payload".to_string()
}
