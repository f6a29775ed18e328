use super::types::{Contact, MessageEntry, Notice};
use crate::sync::LoadPhase;

/// Events the sync service sends up to the front end.
#[derive(Debug, Clone)]
pub enum SyncEvent {
    /// The merged contact list changed. `phase` tells whether the remote
    /// fetch has resolved yet.
    ContactsUpdated {
        contacts: Vec<Contact>,
        phase: LoadPhase,
    },
    ContactAdded(Contact),
    /// The remote push of a newly added contact succeeded.
    ContactSynced(Contact),
    /// Full replacement of the chat working set.
    MessagesUpdated(Vec<MessageEntry>),
    Notice(Notice),
}
