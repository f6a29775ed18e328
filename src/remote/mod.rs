pub mod backoff;
pub mod document;
pub mod firestore;
pub mod memory;
pub mod subscription;

pub use backoff::Backoff;
pub use firestore::FirestoreClient;
pub use memory::MemoryBackend;
pub use subscription::Subscription;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::common::{ChatMessage, Contact, MessageEntry};
use crate::error::SyncError;

pub const CONTACTS_COLLECTION: &str = "contacts";
pub const MESSAGES_COLLECTION: &str = "messages";

/// Live message feed. Every `Ok` item is the complete collection ordered by
/// timestamp; an `Err` reports a transient failure and the feed continues.
pub type SnapshotStream = BoxStream<'static, Result<Vec<MessageEntry>, SyncError>>;

/// Remote `contacts` collection.
#[async_trait]
pub trait RemoteContacts: Send + Sync {
    /// Read the whole collection once. Records missing a required field are skipped.
    async fn fetch_all_once(&self) -> Result<Vec<Contact>, SyncError>;

    /// Insert one `{name, phoneNumber}` document.
    async fn push(&self, contact: &Contact) -> Result<(), SyncError>;
}

/// Remote `messages` collection.
#[async_trait]
pub trait RemoteMessages: Send + Sync {
    fn snapshots(&self) -> SnapshotStream;

    /// Append `{sender, content, timestamp}`.
    async fn send(&self, message: &ChatMessage) -> Result<(), SyncError>;
}

/// Listen to `remote` until the returned handle is cancelled or dropped.
pub fn subscribe<U, E>(remote: &dyn RemoteMessages, on_update: U, on_error: E) -> Subscription
where
    U: FnMut(Vec<MessageEntry>) + Send + 'static,
    E: FnMut(SyncError) + Send + 'static,
{
    Subscription::spawn(remote.snapshots(), on_update, on_error)
}
