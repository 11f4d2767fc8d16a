// src/tap/catalog.rs
//
// Catalog discovery with an on-disk cache: discovery runs once per
// connection directory, then every later sync reuses the cached file.

use crate::error::{Result, SyncError};
use crate::tap::runner::TapRunner;
use serde_json::Value;
use std::fs;
use std::path::Path;
use tracing::info;

/// Return the connection's catalog, discovering it only when no cached
/// file exists. A fresh discovery writes the tap's raw output verbatim to
/// `catalog_path`.
pub async fn ensure_catalog(
    runner: &TapRunner,
    config_path: &Path,
    catalog_path: &Path,
) -> Result<Value> {
    if catalog_path.exists() {
        info!(catalog = %catalog_path.display(), "using cached catalog");
        let content = fs::read_to_string(catalog_path)?;
        return serde_json::from_str(&content)
            .map_err(|e| SyncError::InvalidCatalog(e.to_string()));
    }

    let raw = runner.discover(config_path).await?;
    let catalog: Value =
        serde_json::from_str(&raw).map_err(|e| SyncError::InvalidCatalog(e.to_string()))?;
    let streams = catalog
        .get("streams")
        .and_then(Value::as_array)
        .ok_or_else(|| SyncError::InvalidCatalog("missing `streams` array".to_string()))?;

    for stream in streams {
        if let Some(id) = stream.get("tap_stream_id").and_then(Value::as_str) {
            info!(stream = %id, "discovered stream");
        }
    }

    fs::write(catalog_path, raw.as_bytes())?;
    info!(catalog = %catalog_path.display(), bytes = raw.len(), "catalog written");
    Ok(catalog)
}
