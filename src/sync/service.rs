use tokio::sync::mpsc;

use super::{ChatSession, Pending, Reconciler, settle};
use crate::common::{Contact, MessageEntry, Notice, SyncCommand, SyncEvent};
use crate::error::SyncError;

/// Results of background work, folded back into the service's state.
#[derive(Debug)]
enum Completion {
    RemoteContacts {
        generation: u64,
        result: Result<Vec<Contact>, SyncError>,
    },
    ContactPushed {
        contact: Contact,
        result: Result<(), SyncError>,
    },
    Snapshot {
        subscription: u64,
        snapshot: Vec<MessageEntry>,
    },
    FeedError {
        subscription: u64,
        err: SyncError,
    },
    MessageSent(Result<(), SyncError>),
}

/// Screen-level controller.
///
/// Owns the merged contact list and the chat working set. Commands come in
/// from the front end, I/O runs on spawned tasks, and only this loop ever
/// mutates state.
pub struct SyncService {
    event_sender: mpsc::Sender<SyncEvent>,
    command_receiver: mpsc::Receiver<SyncCommand>,
    completion_sender: mpsc::UnboundedSender<Completion>,
    completion_receiver: mpsc::UnboundedReceiver<Completion>,
    reconciler: Reconciler,
    chat: ChatSession,
}

impl SyncService {
    pub fn new(
        event_sender: mpsc::Sender<SyncEvent>,
        command_receiver: mpsc::Receiver<SyncCommand>,
        reconciler: Reconciler,
        chat: ChatSession,
    ) -> Self {
        let (completion_sender, completion_receiver) = mpsc::unbounded_channel();
        Self {
            event_sender,
            command_receiver,
            completion_sender,
            completion_receiver,
            reconciler,
            chat,
        }
    }

    /// Runs until the command channel closes.
    pub async fn run(mut self) {
        log::info!("Sync service started");

        loop {
            tokio::select! {
                command = self.command_receiver.recv() => {
                    match command {
                        Some(command) => self.handle_command(command).await,
                        None => break,
                    }
                }
                Some(completion) = self.completion_receiver.recv() => {
                    self.handle_completion(completion).await;
                }
            }
        }

        self.chat.close();
        log::info!("Sync service stopped");
    }

    async fn handle_command(&mut self, command: SyncCommand) {
        match command {
            SyncCommand::LoadContacts => match self.reconciler.load_contacts().await {
                Ok((generation, fetch)) => {
                    self.emit_contacts().await;
                    self.forward(fetch, SyncError::RemoteFetch, move |result| {
                        Completion::RemoteContacts { generation, result }
                    });
                }
                Err(err) => self.report(err, "Failed to load saved contacts").await,
            },
            SyncCommand::AddContact { name, phone_number } => {
                match self.reconciler.add_contact(&name, &phone_number).await {
                    Ok((contact, push)) => {
                        self.emit(SyncEvent::ContactAdded(contact.clone())).await;
                        self.emit_contacts().await;
                        self.emit(SyncEvent::Notice(Notice::info("Contact added successfully!")))
                            .await;
                        self.forward(push, SyncError::RemoteWrite, move |result| {
                            Completion::ContactPushed { contact, result }
                        });
                    }
                    Err(err) => self.report(err, "Failed to save contact").await,
                }
            }
            SyncCommand::OpenChat => {
                let updates = self.completion_sender.clone();
                let errors = self.completion_sender.clone();
                self.chat.open(
                    move |subscription, snapshot| {
                        let _ = updates.send(Completion::Snapshot {
                            subscription,
                            snapshot,
                        });
                    },
                    move |subscription, err| {
                        let _ = errors.send(Completion::FeedError { subscription, err });
                    },
                );
            }
            SyncCommand::CloseChat => self.chat.close(),
            SyncCommand::SendMessage(content) => match self.chat.send(&content) {
                Ok(pending) => {
                    self.forward(pending, SyncError::RemoteWrite, Completion::MessageSent)
                }
                Err(err) => self.report(err, "Message not sent").await,
            },
        }
    }

    async fn handle_completion(&mut self, completion: Completion) {
        match completion {
            Completion::RemoteContacts { generation, result } => {
                // Only the latest load settles the screen.
                if !self.reconciler.is_current(generation) {
                    log::debug!("Ignoring contacts of superseded load {generation}");
                    return;
                }
                if let Err(err) = self.reconciler.apply_remote(generation, result) {
                    log::warn!("Error fetching contacts: {err}");
                    self.emit(SyncEvent::Notice(Notice::error(
                        "Failed to fetch contacts from the server.",
                    )))
                    .await;
                }
                self.emit_contacts().await;
            }
            Completion::ContactPushed { contact, result } => match result {
                Ok(()) => {
                    log::info!("Contact {} synced", contact.phone_number);
                    self.emit(SyncEvent::ContactSynced(contact)).await;
                }
                Err(err) => {
                    let context = format!("{} was saved on this device only", contact.name);
                    self.report(err, &context).await;
                }
            },
            Completion::Snapshot {
                subscription,
                snapshot,
            } => {
                // Queued snapshots of a closed or replaced subscription are stale.
                if !self.chat.is_current(subscription) {
                    return;
                }
                self.chat.apply_snapshot(snapshot);
                self.emit(SyncEvent::MessagesUpdated(self.chat.messages().to_vec()))
                    .await;
            }
            Completion::FeedError { subscription, err } => {
                if self.chat.is_current(subscription) {
                    self.report(err, "Message updates interrupted").await;
                }
            }
            Completion::MessageSent(result) => {
                if let Err(err) = result {
                    self.report(err, "Message not sent").await;
                }
            }
        }
    }

    fn forward<T, F>(&self, pending: Pending<T>, on_join_error: fn(String) -> SyncError, wrap: F)
    where
        T: Send + 'static,
        F: FnOnce(Result<T, SyncError>) -> Completion + Send + 'static,
    {
        let completions = self.completion_sender.clone();
        tokio::spawn(async move {
            let result = settle(pending, on_join_error).await;
            let _ = completions.send(wrap(result));
        });
    }

    async fn emit_contacts(&self) {
        self.emit(SyncEvent::ContactsUpdated {
            contacts: self.reconciler.merged(),
            phase: self.reconciler.phase(),
        })
        .await;
    }

    async fn report(&self, err: SyncError, context: &str) {
        let notice = if err.is_validation() {
            log::debug!("Rejected input: {err}");
            Notice::error(err.to_string())
        } else {
            log::error!("{context}: {err}");
            Notice::error(format!("{context}: {err}"))
        };
        self.emit(SyncEvent::Notice(notice)).await;
    }

    async fn emit(&self, event: SyncEvent) {
        if let Err(err) = self.event_sender.send(event).await {
            log::warn!("Failed to notify UI: {err}");
        }
    }
}
