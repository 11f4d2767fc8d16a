// src/sync/mod.rs
pub mod batch;

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use once_cell::sync::OnceCell;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{Result, SyncError};
use crate::settings::Settings;
use crate::storage::{ConnectionRecord, ConnectionStore, ExtractedRecord};
use crate::sync::batch::BatchPersister;
use crate::tap::protocol::TapMessage;
use crate::tap::runner::TapRunner;
use crate::tap::{catalog, validate};

/// One-time metrics registration (so series show up on /metrics).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("sync_runs_total", "Sync runs started.");
        describe_counter!("sync_runs_failed_total", "Sync runs that ended in error.");
        describe_counter!("sync_records_total", "Records extracted across all runs.");
        describe_counter!(
            "sync_unknown_lines_total",
            "Tap output lines that failed protocol classification."
        );
        describe_counter!(
            "sync_chunk_failures_total",
            "Insert chunks that failed and were skipped."
        );
        describe_histogram!("sync_run_seconds", "Wall time of completed sync runs.");
        describe_gauge!("sync_last_run_ts", "Unix ts when a sync run last completed.");
    });
}

/// Result handed back to the trigger boundary on success.
#[derive(Debug, Clone, Serialize)]
pub struct SyncSummary {
    pub per_stream_counts: HashMap<String, u64>,
    pub total_records: u64,
    pub elapsed_seconds: f64,
}

/// On-disk layout for one connection:
/// `<base>/<owner>/<project>/connections/<type>/{config,catalog,state}.json`.
#[derive(Debug, Clone)]
pub struct ConnectionPaths {
    pub dir: PathBuf,
    pub config: PathBuf,
    pub catalog: PathBuf,
    pub state: PathBuf,
}

impl ConnectionPaths {
    pub fn new(base: &Path, conn: &ConnectionRecord) -> Self {
        let dir = base
            .join(&conn.owner_id)
            .join(&conn.project_id)
            .join("connections")
            .join(&conn.connection_type);
        Self {
            config: dir.join("config.json"),
            catalog: dir.join("catalog.json"),
            state: dir.join("state.json"),
            dir,
        }
    }
}

/// Per-connection single-flight: two triggers for the same id queue up,
/// different ids run in parallel.
#[derive(Default)]
pub struct SyncLocks {
    inner: std::sync::Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl SyncLocks {
    pub fn for_connection(&self, id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut map = self.inner.lock().expect("sync locks mutex poisoned");
        map.entry(id.to_string()).or_default().clone()
    }
}

/// Classify accumulated tap output into rows for persistence plus
/// per-stream counts. Malformed lines are counted and skipped, never fatal.
pub fn process_output(
    lines: &[String],
    conn: &ConnectionRecord,
) -> (Vec<ExtractedRecord>, HashMap<String, u64>) {
    let mut records = Vec::new();
    let mut per_stream: HashMap<String, u64> = HashMap::new();

    for line in lines {
        match TapMessage::classify(line) {
            TapMessage::Record { stream, record } => {
                *per_stream.entry(stream.clone()).or_insert(0) += 1;
                records.push(ExtractedRecord {
                    owner_id: conn.owner_id.clone(),
                    project_id: conn.project_id.clone(),
                    connection_id: conn.id.clone(),
                    stream,
                    record,
                });
            }
            TapMessage::Unknown(raw) => {
                counter!("sync_unknown_lines_total").increment(1);
                debug!(len = raw.len(), "skipping unclassified line");
            }
            // Schema and State were already handled live by the runner.
            _ => {}
        }
    }

    for (stream, count) in &per_stream {
        info!(stream = %stream, count, "records per stream");
    }
    if records.is_empty() {
        warn!("tap output produced no records");
    }

    (records, per_stream)
}

/// Execute one end-to-end sync for `connection_id`.
///
/// Sequential steps: fetch connection → write config → validate →
/// catalog (cached or discovered) → mirror catalog to storage → run tap →
/// classify → persist in chunks → save checkpoint → summary.
pub async fn run_sync(
    settings: &Settings,
    store: &dyn ConnectionStore,
    connection_id: &str,
) -> Result<SyncSummary> {
    ensure_metrics_described();
    counter!("sync_runs_total").increment(1);

    let res = run_sync_inner(settings, store, connection_id).await;
    if let Err(e) = &res {
        counter!("sync_runs_failed_total").increment(1);
        tracing::error!(connection = %connection_id, category = e.category(), error = %e, "sync failed");
    }
    res
}

async fn run_sync_inner(
    settings: &Settings,
    store: &dyn ConnectionStore,
    connection_id: &str,
) -> Result<SyncSummary> {
    let started = Instant::now();

    let conn = store
        .fetch_connection(connection_id)
        .await
        .map_err(|e| SyncError::Storage {
            step: "connection-fetch",
            source: e,
        })?
        .ok_or_else(|| SyncError::UnknownConnection(connection_id.to_string()))?;

    info!(
        connection = %conn.id,
        name = %conn.name,
        kind = %conn.connection_type,
        owner = %conn.owner_id,
        "starting sync"
    );

    let paths = ConnectionPaths::new(&settings.base_dir, &conn);
    fs::create_dir_all(&paths.dir)?;
    fs::write(&paths.config, serde_json::to_string_pretty(&conn.config)?)?;

    validate::validate_config(&paths.config)?;

    let runner = TapRunner::new(settings.tap_program(&conn.connection_type))
        .with_timeout(settings.tap_timeout_secs);

    let catalog_doc = catalog::ensure_catalog(&runner, &paths.config, &paths.catalog).await?;
    store
        .update_catalog(&conn.id, &catalog_doc)
        .await
        .map_err(|e| SyncError::Storage {
            step: "catalog-save",
            source: e,
        })?;

    let state_arg = usable_state_path(&paths.state);
    let output = runner
        .run(&paths.config, Some(&paths.catalog), state_arg.as_deref())
        .await?;

    let (records, per_stream_counts) = process_output(&output.lines, &conn);
    let total_records = records.len() as u64;
    counter!("sync_records_total").increment(total_records);

    let outcome = BatchPersister::new(settings.chunk_size)
        .persist(store, &records)
        .await;
    if !outcome.fully_succeeded() {
        warn!(
            chunks_failed = outcome.chunks_failed,
            chunks_total = outcome.chunks_total,
            "some insert chunks failed; run continues"
        );
    }

    // Checkpoint write failures are warnings: the extraction itself
    // succeeded, the next run just resumes from the previous bookmark.
    match &output.last_state {
        Some(state) => match serde_json::to_string_pretty(state) {
            Ok(body) => match fs::write(&paths.state, body) {
                Ok(()) => info!(state = %paths.state.display(), "checkpoint saved"),
                Err(e) => warn!(error = %e, "checkpoint write failed"),
            },
            Err(e) => warn!(error = %e, "checkpoint serialize failed"),
        },
        None => info!("no checkpoint emitted, state file unchanged"),
    }

    let elapsed_seconds = (started.elapsed().as_secs_f64() * 100.0).round() / 100.0;
    histogram!("sync_run_seconds").record(elapsed_seconds);
    gauge!("sync_last_run_ts").set(chrono::Utc::now().timestamp().max(0) as f64);
    info!(
        total_records,
        elapsed_seconds,
        rows_inserted = outcome.rows_inserted,
        "sync completed"
    );

    Ok(SyncSummary {
        per_stream_counts,
        total_records,
        elapsed_seconds,
    })
}

/// Hand the state path to the runner only when any existing file holds
/// parseable JSON; corrupt state means full resync, not a crash.
fn usable_state_path(path: &Path) -> Option<PathBuf> {
    if !path.exists() {
        return Some(path.to_path_buf());
    }
    let parsed = fs::read_to_string(path)
        .map_err(anyhow::Error::from)
        .and_then(|s| serde_json::from_str::<Value>(&s).map_err(Into::into));
    match parsed {
        Ok(_) => Some(path.to_path_buf()),
        Err(e) => {
            warn!(state = %path.display(), error = %e, "unreadable checkpoint, starting fresh");
            None
        }
    }
}
