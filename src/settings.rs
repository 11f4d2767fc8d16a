// src/settings.rs
use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

const ENV_PATH: &str = "TAPSYNC_CONFIG_PATH";
const DEFAULT_TOML: &str = "config/tapsync.toml";

/// Service settings. Env vars win over the TOML file; the TOML file wins
/// over built-in defaults. Storage credentials are env-only.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Root for per-connection working directories.
    pub base_dir: PathBuf,
    /// Records per bulk-insert chunk.
    pub chunk_size: usize,
    /// Tap execution timeout in seconds; 0 disables.
    pub tap_timeout_secs: u64,
    /// Overrides the `tap-<type>` binary resolution when set.
    pub tap_bin: Option<String>,
    /// Listen address for the HTTP surface.
    pub bind_addr: String,
    /// Storage REST endpoint.
    pub supabase_url: String,
    /// Storage API key.
    pub supabase_key: String,
}

#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    base_dir: Option<PathBuf>,
    chunk_size: Option<usize>,
    tap_timeout_secs: Option<u64>,
    tap_bin: Option<String>,
    bind_addr: Option<String>,
}

impl Settings {
    /// Load settings using env var + fallbacks:
    /// 1) $TAPSYNC_CONFIG_PATH
    /// 2) config/tapsync.toml
    /// 3) built-in defaults
    /// then apply env var overrides on top.
    pub fn load() -> Result<Self> {
        let file = if let Ok(p) = std::env::var(ENV_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                return Err(anyhow!("TAPSYNC_CONFIG_PATH points to non-existent path"));
            }
            load_file(&pb)?
        } else {
            let pb = PathBuf::from(DEFAULT_TOML);
            if pb.exists() {
                load_file(&pb)?
            } else {
                FileSettings::default()
            }
        };

        let supabase_url =
            std::env::var("SUPABASE_URL").context("SUPABASE_URL must be set")?;
        let supabase_key =
            std::env::var("SUPABASE_KEY").context("SUPABASE_KEY must be set")?;

        Ok(Self {
            base_dir: env_var("TAP_BASE_DIR")
                .map(PathBuf::from)
                .or(file.base_dir)
                .unwrap_or_else(|| PathBuf::from("users_private")),
            chunk_size: env_parse("TAP_CHUNK_SIZE")?
                .or(file.chunk_size)
                .unwrap_or(500),
            tap_timeout_secs: env_parse("TAP_TIMEOUT_SECS")?
                .or(file.tap_timeout_secs)
                .unwrap_or(3600),
            tap_bin: env_var("TAP_BIN").or(file.tap_bin),
            bind_addr: env_var("TAPSYNC_BIND_ADDR")
                .or(file.bind_addr)
                .unwrap_or_else(|| "0.0.0.0:8000".to_string()),
            supabase_url,
            supabase_key,
        })
    }

    /// Resolve the extractor binary for a connection type.
    /// `TAP_BIN` wins; otherwise the conventional `tap-<type>` name.
    pub fn tap_program(&self, connection_type: &str) -> String {
        self.tap_bin
            .clone()
            .unwrap_or_else(|| format!("tap-{connection_type}"))
    }
}

fn load_file(path: &Path) -> Result<FileSettings> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading settings from {}", path.display()))?;
    toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match env_var(key) {
        Some(v) => v
            .parse::<T>()
            .map(Some)
            .map_err(|e| anyhow!("invalid {key}: {e}")),
        None => Ok(None),
    }
}
