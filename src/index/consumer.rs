use std::sync::Arc;

use anyhow::Result;
use crossbeam::channel::{Receiver, TryRecvError};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::RecordIndex;
use crate::medline::tags::PMID;
use crate::medline::{Record, RecordPool};

#[derive(Debug, Clone, Default, Serialize)]
pub struct ConsumeStats {
    pub received: usize,
    pub indexed: usize,
    pub dropped: usize,
    pub failed: usize,
    pub batches: usize,
}

/// Drains parsed records into a [`RecordIndex`], one transaction per batch.
///
/// Each record is written under its own savepoint so a failed upsert only
/// loses that record. Every record goes back to the pool afterwards.
pub struct IndexConsumer<'i> {
    index: &'i mut RecordIndex,
    pool: Arc<RecordPool>,
    batch_size: usize,
}

impl<'i> IndexConsumer<'i> {
    pub fn new(index: &'i mut RecordIndex, pool: Arc<RecordPool>, batch_size: usize) -> Self {
        Self {
            index,
            pool,
            batch_size: batch_size.max(1),
        }
    }

    /// Runs until every sender is dropped. A failed commit ends the loop with
    /// an error, which closes the channel for the producers.
    pub fn consume(&mut self, records: &Receiver<Record>) -> Result<ConsumeStats> {
        let mut stats = ConsumeStats::default();
        let mut batch = Vec::with_capacity(self.batch_size);

        while let Ok(first) = records.recv() {
            batch.push(first);
            while batch.len() < self.batch_size {
                match records.try_recv() {
                    Ok(record) => batch.push(record),
                    Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
                }
            }

            self.write_batch(&mut batch, &mut stats)?;
        }

        info!(
            received = stats.received,
            indexed = stats.indexed,
            dropped = stats.dropped,
            failed = stats.failed,
            batches = stats.batches,
            "index consumer finished"
        );
        Ok(stats)
    }

    /// Writes one batch and hands every record back to the pool, whether or
    /// not the batch commits. `indexed` only grows once the commit succeeds.
    pub(super) fn write_batch(
        &mut self,
        batch: &mut Vec<Record>,
        stats: &mut ConsumeStats,
    ) -> Result<()> {
        let size = batch.len();
        let outcome = index_batch(self.index, batch, stats);
        for record in batch.drain(..) {
            self.pool.recycle(record);
        }

        stats.indexed += outcome?;
        stats.batches += 1;
        debug!(records = size, "committed index batch");
        Ok(())
    }
}

fn index_batch(
    index: &mut RecordIndex,
    batch: &[Record],
    stats: &mut ConsumeStats,
) -> Result<usize> {
    let mut writes = index.begin_batch()?;
    let mut indexed = 0;

    for record in batch {
        stats.received += 1;
        let Some(pmid) = record.get(PMID) else {
            if record.is_empty() {
                debug!("dropping record whose fields were all ignored");
            } else {
                debug!(fields = record.len(), "dropping record without PMID");
            }
            stats.dropped += 1;
            continue;
        };

        match writes.upsert(pmid, record) {
            Ok(()) => indexed += 1,
            Err(err) => {
                warn!(pmid = %pmid, error = %err, "failed to index record");
                stats.failed += 1;
            }
        }
    }

    writes.commit()?;
    Ok(indexed)
}
