pub mod commands;
pub mod events;
pub mod types;

pub use commands::SyncCommand;
pub use events::SyncEvent;
pub use types::{ChatMessage, Contact, MessageEntry, Notice, NoticeLevel, format_phone_number, now_millis};
