use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value;
use tokio::sync::watch;
use uuid::Uuid;

use super::{RemoteContacts, RemoteMessages, SnapshotStream};
use crate::common::{ChatMessage, Contact, MessageEntry};
use crate::error::SyncError;

#[derive(Debug, Clone)]
enum FeedItem {
    Snapshot(Vec<MessageEntry>),
    Error(String),
}

struct Inner {
    /// Documents keyed by a generated id, kept in insertion order.
    contacts: Mutex<Vec<(String, Value)>>,
    messages: Mutex<Vec<ChatMessage>>,
    feed: watch::Sender<FeedItem>,
    fail_fetch: AtomicBool,
    fail_writes: AtomicBool,
}

/// In-process backend with the same contract as the hosted one.
///
/// Used for offline runs and tests; failures can be switched on to
/// exercise the error paths.
#[derive(Clone)]
pub struct MemoryBackend {
    inner: Arc<Inner>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        let (feed, _) = watch::channel(FeedItem::Snapshot(Vec::new()));
        Self {
            inner: Arc::new(Inner {
                contacts: Mutex::new(Vec::new()),
                messages: Mutex::new(Vec::new()),
                feed,
                fail_fetch: AtomicBool::new(false),
                fail_writes: AtomicBool::new(false),
            }),
        }
    }

    /// Store a raw contact document, bypassing validation. Lets callers seed
    /// records that miss fields, as another client might write them.
    pub fn insert_raw_contact(&self, document: Value) {
        lock(&self.inner.contacts).push((Uuid::new_v4().to_string(), document));
    }

    pub fn set_fail_fetch(&self, fail: bool) {
        self.inner.fail_fetch.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.inner.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Push a transient error to every open feed.
    pub fn inject_feed_error(&self, message: impl Into<String>) {
        self.inner.feed.send_replace(FeedItem::Error(message.into()));
    }

    /// Ids of the stored contact documents, in insertion order.
    pub fn contact_document_ids(&self) -> Vec<String> {
        lock(&self.inner.contacts)
            .iter()
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn stored_contacts(&self) -> Vec<Contact> {
        lock(&self.inner.contacts)
            .iter()
            .filter_map(|(_, doc)| serde_json::from_value(doc.clone()).ok())
            .collect()
    }

    pub fn stored_messages(&self) -> Vec<ChatMessage> {
        lock(&self.inner.messages).clone()
    }

    /// Insert keeping the collection ordered by timestamp; ties keep arrival order.
    pub fn append_message(&self, message: ChatMessage) {
        let snapshot = {
            let mut messages = lock(&self.inner.messages);
            let at = messages.partition_point(|m| m.timestamp <= message.timestamp);
            messages.insert(at, message);
            messages.iter().map(ChatMessage::entry).collect()
        };
        self.inner.feed.send_replace(FeedItem::Snapshot(snapshot));
    }

    fn current_snapshot(&self) -> Vec<MessageEntry> {
        lock(&self.inner.messages).iter().map(ChatMessage::entry).collect()
    }

    fn check_writable(&self) -> Result<(), SyncError> {
        if self.inner.fail_writes.load(Ordering::SeqCst) {
            return Err(SyncError::RemoteWrite("backend unavailable".to_string()));
        }
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl RemoteContacts for MemoryBackend {
    async fn fetch_all_once(&self) -> Result<Vec<Contact>, SyncError> {
        if self.inner.fail_fetch.load(Ordering::SeqCst) {
            return Err(SyncError::RemoteFetch("backend unavailable".to_string()));
        }
        Ok(self.stored_contacts())
    }

    async fn push(&self, contact: &Contact) -> Result<(), SyncError> {
        self.check_writable()?;
        let document =
            serde_json::to_value(contact).map_err(|e| SyncError::RemoteWrite(e.to_string()))?;
        self.insert_raw_contact(document);
        Ok(())
    }
}

#[async_trait]
impl RemoteMessages for MemoryBackend {
    fn snapshots(&self) -> SnapshotStream {
        // Subscribe before reading so no append falls between the two.
        let rx = self.inner.feed.subscribe();
        let initial = self.current_snapshot();
        let updates = futures::stream::unfold(rx, |mut rx| async move {
            rx.changed().await.ok()?;
            let item = match rx.borrow_and_update().clone() {
                FeedItem::Snapshot(snapshot) => Ok(snapshot),
                FeedItem::Error(message) => Err(SyncError::RemoteFetch(message)),
            };
            Some((item, rx))
        });
        futures::stream::once(async move { Ok(initial) })
            .chain(updates)
            .boxed()
    }

    async fn send(&self, message: &ChatMessage) -> Result<(), SyncError> {
        self.check_writable()?;
        self.append_message(message.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn fetch_skips_incomplete_documents() {
        let backend = MemoryBackend::new();
        backend.push(&Contact::new("Alice", "+1 555-0100")).await.unwrap();
        backend.insert_raw_contact(json!({ "name": "No Number" }));
        backend.insert_raw_contact(json!({ "phoneNumber": "+1 555-0199" }));

        let contacts = backend.fetch_all_once().await.unwrap();
        assert_eq!(contacts, vec![Contact::new("Alice", "+1 555-0100")]);
    }

    #[tokio::test]
    async fn every_push_creates_a_new_document() {
        let backend = MemoryBackend::new();
        let alice = Contact::new("Alice", "+1 555-0100");
        backend.push(&alice).await.unwrap();
        backend.push(&alice).await.unwrap();

        let ids = backend.contact_document_ids();
        assert_eq!(ids.len(), 2);
        assert_ne!(ids[0], ids[1]);
        assert!(ids.iter().all(|id| Uuid::parse_str(id).is_ok()));
        assert_eq!(backend.stored_contacts(), vec![alice.clone(), alice]);
    }

    #[tokio::test]
    async fn injected_failures_map_to_remote_errors() {
        let backend = MemoryBackend::new();
        backend.set_fail_fetch(true);
        backend.set_fail_writes(true);
        assert!(matches!(
            backend.fetch_all_once().await,
            Err(SyncError::RemoteFetch(_))
        ));
        assert!(matches!(
            backend.push(&Contact::new("A", "1")).await,
            Err(SyncError::RemoteWrite(_))
        ));
        assert!(backend.stored_contacts().is_empty());
    }

    #[tokio::test]
    async fn feed_starts_with_current_state_and_orders_by_timestamp() {
        let backend = MemoryBackend::new();
        backend.append_message(ChatMessage {
            sender: "Bob".to_string(),
            content: "second".to_string(),
            timestamp: 20,
        });
        let mut feed = backend.snapshots();
        assert_eq!(
            feed.next().await.unwrap().unwrap(),
            vec![MessageEntry::new("Bob", "second")]
        );

        backend.append_message(ChatMessage {
            sender: "You".to_string(),
            content: "first".to_string(),
            timestamp: 10,
        });
        assert_eq!(
            feed.next().await.unwrap().unwrap(),
            vec![
                MessageEntry::new("You", "first"),
                MessageEntry::new("Bob", "second"),
            ]
        );

        backend.inject_feed_error("transport reset");
        assert!(matches!(
            feed.next().await.unwrap(),
            Err(SyncError::RemoteFetch(_))
        ));
    }
}
