mod config;

use std::sync::Arc;

use tracing::info;

use parley_api::routes::router;
use parley_api::state::{AppState, AppStateInner};
use parley_api::storage::BlobStore;
use parley_db::Database;
use parley_gateway::dispatcher::Dispatcher;

use crate::config::ServerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "parley=debug,tower_http=debug".into()),
        )
        .init();

    let config = ServerConfig::from_env()?;

    let db = Database::open(&config.db_path)?;
    let storage = BlobStore::new(config.storage_dir.clone()).await?;

    let state: AppState = Arc::new(AppStateInner {
        db: Arc::new(db),
        dispatcher: Dispatcher::new(),
        storage,
        jwt_secret: config.jwt_secret.clone(),
        public_url: config.public_url.clone(),
        max_upload_bytes: config.max_upload_bytes,
        upload_url_ttl_secs: config.upload_url_ttl_secs,
    });

    let app = router(state);

    let addr = config.addr();
    info!("Parley server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
