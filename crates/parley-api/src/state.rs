use std::sync::Arc;

use tracing::error;

use parley_db::Database;
use parley_gateway::dispatcher::Dispatcher;

use crate::error::{ApiError, ApiResult};
use crate::storage::BlobStore;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub dispatcher: Dispatcher,
    pub storage: BlobStore,
    pub jwt_secret: String,
    /// Base URL clients reach this server on; storage URLs are built from it.
    pub public_url: String,
    pub max_upload_bytes: usize,
    pub upload_url_ttl_secs: u64,
}

/// Run blocking database work off the async runtime.
pub async fn run_blocking<F, T>(state: &AppState, f: F) -> ApiResult<T>
where
    F: FnOnce(&Database) -> ApiResult<T> + Send + 'static,
    T: Send + 'static,
{
    let db = state.db.clone();
    tokio::task::spawn_blocking(move || f(&db))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal(anyhow::anyhow!("blocking task failed"))
        })?
}
