use std::sync::Arc;

use tracing::error;

use lectern_db::Database;

use crate::error::ApiError;
use crate::tracker::ReadTracker;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub tracker: ReadTracker,
    pub jwt_secret: String,
}

impl AppStateInner {
    pub fn new(db: Database, jwt_secret: String) -> AppState {
        let db = Arc::new(db);
        Arc::new(Self {
            tracker: ReadTracker::new(db.clone()),
            db,
            jwt_secret,
        })
    }
}

/// Run blocking DB work off the async runtime.
pub async fn run_blocking<F, T>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        ApiError::Internal
    })?
}
