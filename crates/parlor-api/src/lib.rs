pub mod auth;
pub mod chats;
pub mod error;
pub mod messages;
pub mod middleware;

use anyhow::anyhow;

use crate::error::ApiError;

/// Run core (DB-backed) work off the async runtime. Core calls block on the
/// connection mutex and must not run on an executor thread.
pub(crate) async fn run_blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> parlor_core::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError::from(anyhow!("spawn_blocking join error: {}", e)))?
        .map_err(ApiError::from)
}
