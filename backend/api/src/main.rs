//! FoodShare API: entry point.
//!
//! Opens the configured store (SQLite or the local JSON snapshot), wraps it
//! in a [`LifecycleManager`] and serves the donation/claim REST API.

mod api;
mod config;
mod db;
mod errors;
mod session;

use std::sync::Arc;

use foodshare_core::{LifecycleManager, MemoryStore};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use config::{Config, StoreBackend};
use db::SqliteStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialise structured logging (RUST_LOG controls verbosity).
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // Load optional .env file (ignored if missing).
    let _ = dotenvy::dotenv();

    let config = Config::from_env().map_err(|e| anyhow::anyhow!("{e}"))?;

    let api_state = match config.store_backend {
        StoreBackend::Sqlite => {
            let pool = db::init_pool(&config.database_url, config.db_max_connections).await?;
            let sqlite = SqliteStore::new(pool);
            api::ApiState {
                manager: LifecycleManager::with_view_limits(
                    Arc::new(sqlite.clone()),
                    config.view_limits,
                ),
                sqlite: Some(sqlite),
            }
        }
        StoreBackend::Local => {
            let store = MemoryStore::open(&config.local_store_path)
                .await
                .map_err(|e| anyhow::anyhow!("{e}"))?;
            info!("Using local store at {}", config.local_store_path.display());
            api::ApiState {
                manager: LifecycleManager::with_view_limits(Arc::new(store), config.view_limits),
                sqlite: None,
            }
        }
    };

    let app = api::router(Arc::new(api_state))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr = format!("0.0.0.0:{}", config.api_port);
    info!("API listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
