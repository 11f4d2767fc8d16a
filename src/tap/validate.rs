// src/tap/validate.rs
//
// Validates the tap config document before any process is spawned, and
// normalizes `start_date` to UTC in place (rewrite is idempotent).

use crate::error::{Result, SyncError};
use serde_json::Value;
use std::fs;
use std::path::Path;
use tracing::info;

/// Keys every tap config must carry.
pub const REQUIRED_FIELDS: [&str; 4] = ["site_url", "consumer_key", "consumer_secret", "start_date"];

/// Validate the config file at `path`.
///
/// Fails with `MalformedConfig` (with parser position), `MissingFields`
/// naming exactly the absent keys, or `InvalidScheme`. When `start_date`
/// lacks the trailing `Z` it is appended and the file rewritten before
/// returning Ok.
pub fn validate_config(path: &Path) -> Result<()> {
    if !path.exists() {
        return Err(SyncError::ConfigNotFound(path.to_path_buf()));
    }

    let content = fs::read_to_string(path)?;
    let mut config: Value =
        serde_json::from_str(&content).map_err(|e| SyncError::MalformedConfig {
            path: path.display().to_string(),
            // serde_json includes "at line L column C" in its Display
            detail: e.to_string(),
        })?;

    let obj = config.as_object().ok_or_else(|| SyncError::MalformedConfig {
        path: path.display().to_string(),
        detail: "expected a JSON object".to_string(),
    })?;

    let missing: Vec<String> = REQUIRED_FIELDS
        .iter()
        .filter(|f| !obj.contains_key(**f))
        .map(|f| f.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(SyncError::MissingFields(missing));
    }

    let site_url = obj.get("site_url").and_then(Value::as_str).unwrap_or("");
    if !site_url.starts_with("http://") && !site_url.starts_with("https://") {
        return Err(SyncError::InvalidScheme);
    }

    // Normalize start_date to the UTC marker and persist the correction.
    if let Some(start) = obj.get("start_date").and_then(Value::as_str) {
        if !start.ends_with('Z') {
            let corrected = format!("{start}Z");
            info!(start_date = %corrected, "normalized start_date to UTC");
            config["start_date"] = Value::String(corrected);
            fs::write(path, serde_json::to_string_pretty(&config)?.as_bytes())?;
        }
    }

    Ok(())
}
