// src/lib.rs
// Public library surface for integration tests (and potential reuse).

pub mod api;
pub mod error;
pub mod metrics;
pub mod settings;
pub mod storage;
pub mod sync;
pub mod tap;

// ---- Re-exports for stable public API ----
pub use crate::api::{router, AppState};
pub use crate::error::SyncError;
pub use crate::settings::Settings;
pub use crate::storage::{ConnectionRecord, ConnectionStore, ExtractedRecord, SupabaseStore};
pub use crate::sync::{run_sync, SyncSummary};
pub use crate::tap::protocol::TapMessage;
pub use crate::tap::runner::{TapOutput, TapRunner};
