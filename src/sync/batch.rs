// src/sync/batch.rs
//
// Chunked persistence. A failed chunk is logged and counted, never fatal:
// the loop always advances to the next chunk.

use crate::storage::{ConnectionStore, ExtractedRecord, RAW_DATA_TABLE};
use metrics::counter;
use tracing::{info, warn};

/// Outcome of one persistence pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PersistOutcome {
    pub chunks_total: usize,
    pub chunks_failed: usize,
    pub rows_inserted: usize,
}

impl PersistOutcome {
    pub fn fully_succeeded(&self) -> bool {
        self.chunks_failed == 0
    }
}

/// Forwards records to the store's bulk insert in fixed-size chunks,
/// preserving order.
pub struct BatchPersister {
    chunk_size: usize,
}

impl BatchPersister {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
        }
    }

    pub async fn persist(
        &self,
        store: &dyn ConnectionStore,
        records: &[ExtractedRecord],
    ) -> PersistOutcome {
        let mut outcome = PersistOutcome::default();
        if records.is_empty() {
            info!("no records to persist, skipping");
            return outcome;
        }

        for chunk in records.chunks(self.chunk_size) {
            outcome.chunks_total += 1;
            match store.insert_rows(RAW_DATA_TABLE, chunk).await {
                Ok(()) => {
                    outcome.rows_inserted += chunk.len();
                    info!(
                        chunk = outcome.chunks_total,
                        rows = chunk.len(),
                        total = outcome.rows_inserted,
                        "chunk inserted"
                    );
                }
                Err(e) => {
                    outcome.chunks_failed += 1;
                    counter!("sync_chunk_failures_total").increment(1);
                    warn!(
                        chunk = outcome.chunks_total,
                        rows = chunk.len(),
                        error = ?e,
                        "chunk insert failed, continuing"
                    );
                }
            }
        }

        outcome
    }
}
