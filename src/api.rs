use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tower_http::cors::CorsLayer;

use crate::error::SyncError;
use crate::settings::Settings;
use crate::storage::ConnectionStore;
use crate::sync::{self, SyncLocks, SyncSummary};

#[derive(Clone)]
pub struct AppState {
    settings: Arc<Settings>,
    store: Arc<dyn ConnectionStore>,
    locks: Arc<SyncLocks>,
}

impl AppState {
    pub fn new(settings: Arc<Settings>, store: Arc<dyn ConnectionStore>) -> Self {
        Self {
            settings,
            store,
            locks: Arc::new(SyncLocks::default()),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/api/connections/{id}/sync", post(trigger_sync))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

#[derive(serde::Serialize)]
struct SyncResponse {
    message: String,
    #[serde(flatten)]
    summary: SyncSummary,
}

#[derive(serde::Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

async fn trigger_sync(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SyncResponse>, (StatusCode, Json<ErrorBody>)> {
    // Serialize runs per connection id; other connections proceed in parallel.
    let lock = state.locks.for_connection(&id);
    let _guard = lock.lock().await;

    match sync::run_sync(&state.settings, state.store.as_ref(), &id).await {
        Ok(summary) => Ok(Json(SyncResponse {
            message: "sync completed".to_string(),
            summary,
        })),
        Err(e) => Err((
            status_for(&e),
            Json(ErrorBody {
                error: e.category(),
                message: e.to_string(),
            }),
        )),
    }
}

fn status_for(e: &SyncError) -> StatusCode {
    match e {
        SyncError::UnknownConnection(_) => StatusCode::NOT_FOUND,
        SyncError::MalformedConfig { .. }
        | SyncError::MissingFields(_)
        | SyncError::InvalidScheme => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
