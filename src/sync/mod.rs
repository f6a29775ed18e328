pub mod chat;
pub mod reconciler;
pub mod service;

pub use chat::{ChatSession, MessageLog};
pub use reconciler::{LoadPhase, Reconciler, merged_view};
pub use service::SyncService;

use tokio::task::JoinHandle;

use crate::error::SyncError;

/// Background remote operation started by the reconciler or chat session.
pub type Pending<T> = JoinHandle<Result<T, SyncError>>;

/// Run a blocking storage call on the blocking pool.
pub(crate) async fn run_blocking<T, F>(f: F) -> Result<T, SyncError>
where
    F: FnOnce() -> Result<T, SyncError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| SyncError::LocalStorage(format!("storage task failed: {e}")))?
}

/// Wait for a background operation. A task that panicked or was aborted
/// is reported through `on_join_error`.
pub async fn settle<T>(pending: Pending<T>, on_join_error: fn(String) -> SyncError) -> Result<T, SyncError> {
    match pending.await {
        Ok(result) => result,
        Err(err) => Err(on_join_error(err.to_string())),
    }
}
