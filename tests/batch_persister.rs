// tests/batch_persister.rs
//
// Chunking contract: fixed-size chunks in order, contained per-chunk
// failures, accurate outcome tallies.

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Mutex;

use tapsync::storage::{ConnectionRecord, ConnectionStore, ExtractedRecord};
use tapsync::sync::batch::BatchPersister;

struct RecordingStore {
    chunks: Mutex<Vec<Vec<ExtractedRecord>>>,
    /// 1-based call indexes that should fail.
    fail_calls: Vec<usize>,
    calls: Mutex<usize>,
}

impl RecordingStore {
    fn new(fail_calls: Vec<usize>) -> Self {
        Self {
            chunks: Mutex::new(Vec::new()),
            fail_calls,
            calls: Mutex::new(0),
        }
    }

    fn chunk_sizes(&self) -> Vec<usize> {
        self.chunks.lock().unwrap().iter().map(Vec::len).collect()
    }
}

#[async_trait]
impl ConnectionStore for RecordingStore {
    async fn fetch_connection(&self, _id: &str) -> Result<Option<ConnectionRecord>> {
        unreachable!("not used by the persister")
    }
    async fn update_catalog(&self, _id: &str, _catalog: &Value) -> Result<()> {
        unreachable!("not used by the persister")
    }
    async fn insert_rows(&self, _table: &str, rows: &[ExtractedRecord]) -> Result<()> {
        let call = {
            let mut c = self.calls.lock().unwrap();
            *c += 1;
            *c
        };
        if self.fail_calls.contains(&call) {
            bail!("storage unavailable for chunk {call}");
        }
        self.chunks.lock().unwrap().push(rows.to_vec());
        Ok(())
    }
}

fn records(n: usize) -> Vec<ExtractedRecord> {
    (0..n)
        .map(|i| ExtractedRecord {
            owner_id: "u1".into(),
            project_id: "p1".into(),
            connection_id: "c1".into(),
            stream: "orders".into(),
            record: serde_json::json!({ "seq": i }),
        })
        .collect()
}

#[tokio::test]
async fn twelve_hundred_records_make_three_ordered_chunks() {
    let store = RecordingStore::new(vec![]);
    let outcome = BatchPersister::new(500).persist(&store, &records(1200)).await;

    assert_eq!(store.chunk_sizes(), vec![500, 500, 200]);
    assert_eq!(outcome.chunks_total, 3);
    assert_eq!(outcome.chunks_failed, 0);
    assert_eq!(outcome.rows_inserted, 1200);

    // Order preserved across chunk boundaries.
    let chunks = store.chunks.lock().unwrap();
    assert_eq!(chunks[0][0].record["seq"], 0);
    assert_eq!(chunks[1][0].record["seq"], 500);
    assert_eq!(chunks[2][0].record["seq"], 1000);
    assert_eq!(chunks[2][199].record["seq"], 1199);
}

#[tokio::test]
async fn failed_middle_chunk_does_not_stop_the_loop() {
    let store = RecordingStore::new(vec![2]);
    let outcome = BatchPersister::new(500).persist(&store, &records(1200)).await;

    assert_eq!(store.chunk_sizes(), vec![500, 200], "chunks 1 and 3 landed");
    assert_eq!(outcome.chunks_total, 3);
    assert_eq!(outcome.chunks_failed, 1);
    assert_eq!(outcome.rows_inserted, 700);
    assert!(!outcome.fully_succeeded());
}

#[tokio::test]
async fn every_chunk_failing_still_returns_an_outcome() {
    let store = RecordingStore::new(vec![1, 2, 3]);
    let outcome = BatchPersister::new(500).persist(&store, &records(1200)).await;

    assert!(store.chunk_sizes().is_empty());
    assert_eq!(outcome.chunks_failed, 3);
    assert_eq!(outcome.rows_inserted, 0);
}

#[tokio::test]
async fn chunk_size_one_inserts_row_by_row() {
    let store = RecordingStore::new(vec![]);
    let outcome = BatchPersister::new(1).persist(&store, &records(3)).await;
    assert_eq!(store.chunk_sizes(), vec![1, 1, 1]);
    assert_eq!(outcome.rows_inserted, 3);
}
