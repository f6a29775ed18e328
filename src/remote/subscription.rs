use futures::StreamExt;
use tokio::task::JoinHandle;

use super::SnapshotStream;
use crate::common::MessageEntry;
use crate::error::SyncError;

/// Handle to a live message feed consumer.
///
/// The feed keeps running across errors until `cancel` is called or the
/// handle is dropped. Cancelling twice is a no-op.
pub struct Subscription {
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    /// Drive `stream` on a background task, handing each full snapshot to
    /// `on_update` and each feed error to `on_error`.
    pub fn spawn<U, E>(mut stream: SnapshotStream, mut on_update: U, mut on_error: E) -> Self
    where
        U: FnMut(Vec<MessageEntry>) + Send + 'static,
        E: FnMut(SyncError) + Send + 'static,
    {
        let task = tokio::spawn(async move {
            while let Some(item) = stream.next().await {
                match item {
                    Ok(snapshot) => on_update(snapshot),
                    Err(err) => on_error(err),
                }
            }
            log::debug!("Message feed ended");
        });
        Self { task: Some(task) }
    }

    pub fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            log::debug!("Message subscription cancelled");
        }
    }

    pub fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use std::time::Duration;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn errors_do_not_end_the_feed() {
        let items = vec![
            Ok(vec![MessageEntry::new("You", "hi")]),
            Err(SyncError::RemoteFetch("offline".to_string())),
            Ok(vec![
                MessageEntry::new("You", "hi"),
                MessageEntry::new("Bob", "hey"),
            ]),
        ];
        let (tx, mut rx) = mpsc::unbounded_channel();
        let err_tx = tx.clone();
        let _sub = Subscription::spawn(
            stream::iter(items).boxed(),
            move |snapshot| {
                let _ = tx.send(Ok(snapshot.len()));
            },
            move |err| {
                let _ = err_tx.send(Err(err));
            },
        );

        assert_eq!(rx.recv().await, Some(Ok(1)));
        assert!(matches!(rx.recv().await, Some(Err(SyncError::RemoteFetch(_)))));
        assert_eq!(rx.recv().await, Some(Ok(2)));
    }

    #[tokio::test]
    async fn cancel_is_idempotent_and_stops_delivery() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut sub = Subscription::spawn(
            stream::pending().boxed(),
            move |snapshot: Vec<MessageEntry>| {
                let _ = tx.send(snapshot);
            },
            |_| {},
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(sub.is_active());

        sub.cancel();
        sub.cancel();
        assert!(!sub.is_active());
        assert_eq!(rx.recv().await, None);
    }
}
