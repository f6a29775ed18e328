pub mod contact_db;
pub mod database;
pub mod models;
pub mod session_store;

pub use contact_db::ContactDatabase;
pub use models::Session;
pub use session_store::SessionStore;

use crate::common::Contact;
use crate::error::SyncError;

/// Durable on-device contact storage.
///
/// Calls block; async callers run them on the blocking pool.
pub trait LocalStore: Send + Sync {
    /// Append one contact. No uniqueness is enforced.
    fn insert(&self, contact: &Contact) -> Result<(), SyncError>;

    /// Every contact ever inserted, in insertion order.
    fn list_all(&self) -> Result<Vec<Contact>, SyncError>;
}
