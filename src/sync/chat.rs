use std::sync::Arc;

use crate::common::{ChatMessage, MessageEntry};
use crate::error::SyncError;
use crate::remote::{RemoteMessages, Subscription, subscribe};

use super::Pending;

/// The chat view's working set. Each snapshot replaces it wholesale.
#[derive(Debug, Default, Clone)]
pub struct MessageLog {
    entries: Vec<MessageEntry>,
}

impl MessageLog {
    pub fn apply_snapshot(&mut self, snapshot: Vec<MessageEntry>) {
        self.entries = snapshot;
    }

    pub fn entries(&self) -> &[MessageEntry] {
        &self.entries
    }
}

/// One visit to the chat view: a live subscription plus the outgoing side.
pub struct ChatSession {
    remote: Arc<dyn RemoteMessages>,
    sender_name: String,
    log: MessageLog,
    subscription: Option<Subscription>,
    /// Id handed to the callbacks of the latest subscription.
    subscription_id: u64,
}

impl ChatSession {
    pub fn new(remote: Arc<dyn RemoteMessages>, sender_name: impl Into<String>) -> Self {
        Self {
            remote,
            sender_name: sender_name.into(),
            log: MessageLog::default(),
            subscription: None,
            subscription_id: 0,
        }
    }

    /// Start listening. An already open subscription is replaced.
    ///
    /// Both callbacks receive the id this call returns, so results that were
    /// already queued by an earlier subscription can be told apart.
    pub fn open<U, E>(&mut self, mut on_update: U, mut on_error: E) -> u64
    where
        U: FnMut(u64, Vec<MessageEntry>) + Send + 'static,
        E: FnMut(u64, SyncError) + Send + 'static,
    {
        self.close();
        self.subscription_id += 1;
        let id = self.subscription_id;
        self.subscription = Some(subscribe(
            self.remote.as_ref(),
            move |snapshot| on_update(id, snapshot),
            move |err| on_error(id, err),
        ));
        log::info!("Listening for messages (subscription {id})");
        id
    }

    /// Stop listening. Safe to call when already closed.
    pub fn close(&mut self) {
        if let Some(mut subscription) = self.subscription.take() {
            subscription.cancel();
        }
    }

    pub fn is_open(&self) -> bool {
        self.subscription.is_some()
    }

    /// True while `id` names the open subscription.
    pub fn is_current(&self, id: u64) -> bool {
        self.is_open() && id == self.subscription_id
    }

    pub fn apply_snapshot(&mut self, snapshot: Vec<MessageEntry>) {
        self.log.apply_snapshot(snapshot);
    }

    pub fn messages(&self) -> &[MessageEntry] {
        self.log.entries()
    }

    /// Write a message in the background. The caller clears its input
    /// straight away; the write outcome arrives through the returned task.
    pub fn send(&self, content: &str) -> Result<Pending<()>, SyncError> {
        if content.trim().is_empty() {
            return Err(SyncError::Validation("Message is empty.".to_string()));
        }
        let message = ChatMessage::new(self.sender_name.clone(), content);
        let remote = Arc::clone(&self.remote);
        Ok(tokio::spawn(async move {
            let result = remote.send(&message).await;
            if let Err(err) = &result {
                log::error!("Error sending message: {err}");
            }
            result
        }))
    }
}

impl Drop for ChatSession {
    fn drop(&mut self) {
        self.close();
    }
}
