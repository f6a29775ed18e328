use crate::common::{Contact, MessageEntry, Notice, NoticeLevel, SyncEvent};
use crate::sync::LoadPhase;

const MAX_NOTICES: usize = 100;

/// Local state of the terminal front end.
pub struct AppState {
    pub contacts: Vec<Contact>,
    pub phase: LoadPhase,
    pub messages: Vec<MessageEntry>,
    pub notices: Vec<Notice>,
    pub input_text: String,
}

impl AppState {
    pub fn new() -> Self {
        Self {
            contacts: Vec::new(),
            phase: LoadPhase::Idle,
            messages: Vec::new(),
            notices: Vec::new(),
            input_text: String::new(),
        }
    }

    /// Fold an event in and return the lines to print for it.
    pub fn apply(&mut self, event: SyncEvent) -> Vec<String> {
        match event {
            SyncEvent::ContactsUpdated { contacts, phase } => {
                self.contacts = contacts;
                self.phase = phase;
                render_contacts(&self.contacts, phase)
            }
            SyncEvent::ContactAdded(contact) => {
                vec![format!("+ {} ({})", contact.name, contact.phone_number)]
            }
            SyncEvent::ContactSynced(contact) => {
                vec![format!("  {} synced", contact.phone_number)]
            }
            SyncEvent::MessagesUpdated(messages) => self.replace_messages(messages),
            SyncEvent::Notice(notice) => {
                let line = render_notice(&notice);
                self.push_notice(notice);
                vec![line]
            }
        }
    }

    /// Swap in a new snapshot. When the old one is a prefix only the new
    /// tail is printed; otherwise the whole conversation is redrawn.
    fn replace_messages(&mut self, messages: Vec<MessageEntry>) -> Vec<String> {
        let extends = messages.len() >= self.messages.len()
            && messages[..self.messages.len()] == self.messages[..];
        let mut lines = Vec::new();
        let start = if extends {
            self.messages.len()
        } else {
            lines.push("--- conversation ---".to_string());
            0
        };
        lines.extend(messages[start..].iter().map(render_message));
        self.messages = messages;
        lines
    }

    fn push_notice(&mut self, notice: Notice) {
        self.notices.push(notice);
        if self.notices.len() > MAX_NOTICES {
            self.notices.remove(0);
        }
    }

    /// Take the typed line, leaving the input empty.
    pub fn take_input(&mut self) -> Option<String> {
        let text = std::mem::take(&mut self.input_text);
        if text.trim().is_empty() {
            None
        } else {
            Some(text)
        }
    }

    pub fn last_error(&self) -> Option<&Notice> {
        self.notices
            .iter()
            .rev()
            .find(|notice| notice.level == NoticeLevel::Error)
    }
}

fn render_contacts(contacts: &[Contact], phase: LoadPhase) -> Vec<String> {
    let status = match phase {
        LoadPhase::Idle => "",
        LoadPhase::Fetching => " (syncing...)",
        LoadPhase::Merged => "",
    };
    let mut lines = vec![format!("Contacts: {}{status}", contacts.len())];
    lines.extend(
        contacts
            .iter()
            .map(|contact| format!("  {:<24} {}", contact.name, contact.phone_number)),
    );
    lines
}

fn render_message(message: &MessageEntry) -> String {
    format!("[{}] {}", message.sender, message.content)
}

fn render_notice(notice: &Notice) -> String {
    match notice.level {
        NoticeLevel::Info => format!("* {}", notice.text),
        NoticeLevel::Error => format!("! {}", notice.text),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn growing_snapshot_prints_only_new_messages() {
        let mut state = AppState::new();
        let m1 = MessageEntry::new("You", "hi");
        let m2 = MessageEntry::new("Bob", "hello");

        assert_eq!(
            state.apply(SyncEvent::MessagesUpdated(vec![m1.clone()])),
            vec!["[You] hi"]
        );
        assert_eq!(
            state.apply(SyncEvent::MessagesUpdated(vec![m1.clone(), m2.clone()])),
            vec!["[Bob] hello"]
        );
        assert_eq!(state.messages, vec![m1, m2]);
    }

    #[test]
    fn diverging_snapshot_redraws() {
        let mut state = AppState::new();
        state.apply(SyncEvent::MessagesUpdated(vec![MessageEntry::new("You", "a")]));
        let lines = state.apply(SyncEvent::MessagesUpdated(vec![
            MessageEntry::new("Bob", "z"),
            MessageEntry::new("You", "a"),
        ]));
        assert_eq!(lines, vec!["--- conversation ---", "[Bob] z", "[You] a"]);
    }

    #[test]
    fn contacts_render_with_sync_status() {
        let mut state = AppState::new();
        let lines = state.apply(SyncEvent::ContactsUpdated {
            contacts: vec![Contact::new("Alice", "+1 555-0100")],
            phase: LoadPhase::Fetching,
        });
        assert_eq!(lines[0], "Contacts: 1 (syncing...)");
        assert!(lines[1].contains("Alice"));
        assert_eq!(state.phase, LoadPhase::Fetching);
    }

    #[test]
    fn input_is_cleared_when_taken() {
        let mut state = AppState::new();
        state.input_text = "hello".to_string();
        assert_eq!(state.take_input().as_deref(), Some("hello"));
        assert!(state.input_text.is_empty());

        state.input_text = "   ".to_string();
        assert_eq!(state.take_input(), None);
        assert!(state.input_text.is_empty());
    }

    #[test]
    fn errors_are_remembered() {
        let mut state = AppState::new();
        state.apply(SyncEvent::Notice(Notice::error("Please fill in both fields.")));
        state.apply(SyncEvent::Notice(Notice::info("ok")));
        assert_eq!(state.last_error().unwrap().text, "Please fill in both fields.");
    }
}
