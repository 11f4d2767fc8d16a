//! Tap Sync Service binary entrypoint.
//! Boots the Axum HTTP server, wiring the trigger route, shared state, and
//! the Prometheus exposition endpoint.

use std::fs;
use std::sync::Arc;

use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use tapsync::api::{self, AppState};
use tapsync::metrics::Metrics;
use tapsync::settings::Settings;
use tapsync::storage::SupabaseStore;

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tapsync=info,warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    init_tracing();

    let settings = Settings::load()?;
    fs::create_dir_all(&settings.base_dir)?;

    let metrics = Metrics::init(settings.chunk_size);
    let store = Arc::new(SupabaseStore::new(
        &settings.supabase_url,
        &settings.supabase_key,
    ));

    let bind_addr = settings.bind_addr.clone();
    let state = AppState::new(Arc::new(settings), store);
    let app = api::router(state).merge(metrics.router());

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(addr = %bind_addr, "tapsync listening");
    axum::serve(listener, app).await?;
    Ok(())
}
