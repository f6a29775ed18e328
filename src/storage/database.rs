use rusqlite::{Connection, Result as SqlResult};
use std::fs;
use std::path::Path;
use std::sync::Mutex;

use crate::error::SyncError;

/// Base database connection wrapper.
///
/// The connection sits behind a mutex so a store can be shared across
/// blocking tasks; each call holds the lock for one statement batch.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, SyncError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| {
                    SyncError::LocalStorage(format!("cannot create {}: {e}", parent.display()))
                })?;
            }
        }
        let conn = Connection::open(path)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn in_memory() -> Result<Self, SyncError> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Run `f` with exclusive access to the connection.
    pub fn with_connection<T, F>(&self, f: F) -> Result<T, SyncError>
    where
        F: FnOnce(&Connection) -> SqlResult<T>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|_| SyncError::LocalStorage("database lock poisoned".to_string()))?;
        f(&conn).map_err(SyncError::from)
    }
}
