/// Commands the front end sends to the sync service.
#[derive(Debug, Clone)]
pub enum SyncCommand {
    /// Contact screen opened: read the local cache, then fetch remote contacts.
    LoadContacts,
    /// Add-contact form submitted. `phone_number` already carries the country code.
    AddContact { name: String, phone_number: String },
    /// Chat view opened: start listening to the message collection.
    OpenChat,
    /// Chat view left: stop listening.
    CloseChat,
    SendMessage(String),
}
