/// Sync pipeline errors
use std::path::PathBuf;
use thiserror::Error;

/// Result type for sync operations
pub type Result<T> = std::result::Result<T, SyncError>;

/// Errors that abort a sync run.
///
/// Contained conditions (malformed protocol lines, failed insert chunks,
/// checkpoint write problems) never surface here; they are logged and
/// counted where they happen.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Config file is not parseable JSON
    #[error("malformed config at {path}: {detail}")]
    MalformedConfig { path: String, detail: String },

    /// Config is missing required keys
    #[error("config missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<String>),

    /// site_url lacks an http(s) scheme
    #[error("site_url must start with http:// or https://")]
    InvalidScheme,

    /// Discovery process exited non-zero
    #[error("catalog discovery failed (exit code {code:?}): {stderr}")]
    Discovery { code: Option<i32>, stderr: String },

    /// Discovery output is not a catalog document
    #[error("discovery output is not a valid catalog: {0}")]
    InvalidCatalog(String),

    /// Config file missing before spawn
    #[error("config file not found: {0}")]
    ConfigNotFound(PathBuf),

    /// Catalog file missing before spawn
    #[error("catalog file not found: {0}")]
    CatalogNotFound(PathBuf),

    /// Tap process exited non-zero during extraction
    #[error("tap exited with code {code:?}: {stderr}")]
    ExtractorExecution { code: Option<i32>, stderr: String },

    /// Tap process exceeded the configured execution timeout
    #[error("tap timed out after {0}s")]
    ExtractorTimeout(u64),

    /// Connection id unknown to the storage backend
    #[error("connection not found: {0}")]
    UnknownConnection(String),

    /// Fatal storage failure (connection fetch, catalog mirror)
    #[error("storage error during {step}: {source}")]
    Storage {
        step: &'static str,
        #[source]
        source: anyhow::Error,
    },

    /// Filesystem failure while preparing the run directory
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for SyncError {
    fn from(e: serde_json::Error) -> Self {
        SyncError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }
}

impl SyncError {
    /// Short category label used in API error bodies and logs.
    pub fn category(&self) -> &'static str {
        match self {
            SyncError::MalformedConfig { .. }
            | SyncError::MissingFields(_)
            | SyncError::InvalidScheme => "config",
            SyncError::Discovery { .. } | SyncError::InvalidCatalog(_) => "discovery",
            SyncError::ConfigNotFound(_) | SyncError::CatalogNotFound(_) => "not_found",
            SyncError::ExtractorExecution { .. } | SyncError::ExtractorTimeout(_) => "extractor",
            SyncError::UnknownConnection(_) => "unknown_connection",
            SyncError::Storage { .. } => "storage",
            SyncError::Io(_) => "io",
        }
    }
}
