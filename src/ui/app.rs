use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;

use crate::common::{NoticeLevel, SyncCommand, SyncEvent};
use crate::sync::LoadPhase;

use super::state::AppState;

/// Line-oriented front end over the sync service channels.
pub struct ConsoleApp {
    state: AppState,
    command_sender: mpsc::Sender<SyncCommand>,
    event_receiver: mpsc::Receiver<SyncEvent>,
}

impl ConsoleApp {
    pub fn new(
        command_sender: mpsc::Sender<SyncCommand>,
        event_receiver: mpsc::Receiver<SyncEvent>,
    ) -> Self {
        Self {
            state: AppState::new(),
            command_sender,
            event_receiver,
        }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    async fn send_command(&self, command: SyncCommand) {
        if let Err(err) = self.command_sender.send(command).await {
            log::warn!("Failed to send command to sync service: {err}");
        }
    }

    /// Print and fold the next event. `None` once the service is gone.
    async fn next_event(&mut self) -> Option<SyncEvent> {
        let event = self.event_receiver.recv().await?;
        for line in self.state.apply(event.clone()) {
            println!("{line}");
        }
        Some(event)
    }

    /// Contact screen: show cached contacts, then the merged list.
    pub async fn show_contacts(&mut self) {
        self.send_command(SyncCommand::LoadContacts).await;
        while let Some(event) = self.next_event().await {
            match event {
                SyncEvent::ContactsUpdated { phase: LoadPhase::Merged, .. } => break,
                // Local cache unreadable: there is no fetch to wait for.
                SyncEvent::Notice(notice)
                    if notice.level == NoticeLevel::Error
                        && self.state.phase != LoadPhase::Fetching =>
                {
                    break;
                }
                _ => {}
            }
        }
    }

    /// Add-contact form. Waits until the remote push settled.
    pub async fn add_contact(&mut self, name: String, phone_number: String) {
        self.send_command(SyncCommand::AddContact { name, phone_number })
            .await;
        while let Some(event) = self.next_event().await {
            match event {
                SyncEvent::ContactSynced(_) => break,
                // Either rejected before any write, or the push failed after it.
                SyncEvent::Notice(notice) if notice.level == NoticeLevel::Error => break,
                _ => {}
            }
        }
    }

    /// Chat view: live conversation plus typed input until `/quit` or EOF.
    pub async fn chat<R>(&mut self, input: R)
    where
        R: AsyncBufRead + Unpin,
    {
        println!("Type a message and press Enter. /quit leaves the chat.");
        self.send_command(SyncCommand::OpenChat).await;
        let mut lines = input.lines();

        loop {
            tokio::select! {
                line = lines.next_line() => {
                    match line {
                        Ok(Some(line)) if line.trim() == "/quit" => break,
                        Ok(Some(line)) => {
                            self.state.input_text = line;
                            if let Some(content) = self.state.take_input() {
                                self.send_command(SyncCommand::SendMessage(content)).await;
                            }
                        }
                        Ok(None) => break,
                        Err(err) => {
                            log::warn!("Failed to read input: {err}");
                            break;
                        }
                    }
                }
                event = self.next_event() => {
                    if event.is_none() {
                        break;
                    }
                }
            }
        }

        self.send_command(SyncCommand::CloseChat).await;
    }
}
