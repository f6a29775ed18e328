use thiserror::Error;

/// Failure taxonomy for the sync facade.
///
/// Every variant is terminal for the operation that raised it only: the
/// sync service logs it, turns it into a transient notice and keeps going.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    /// Local cache read/write failed (disk, schema, lock poisoning).
    #[error("local storage error: {0}")]
    LocalStorage(String),

    /// Reading a remote collection failed (network, permission, bad payload).
    #[error("remote fetch failed: {0}")]
    RemoteFetch(String),

    /// Writing to a remote collection failed.
    #[error("remote write failed: {0}")]
    RemoteWrite(String),

    /// Required user input was missing; raised before any I/O.
    #[error("{0}")]
    Validation(String),

    /// The authentication provider rejected the request.
    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl SyncError {
    /// Failures the user can act on by fixing their input.
    pub fn is_validation(&self) -> bool {
        matches!(self, SyncError::Validation(_))
    }
}

impl From<rusqlite::Error> for SyncError {
    fn from(err: rusqlite::Error) -> Self {
        SyncError::LocalStorage(err.to_string())
    }
}
