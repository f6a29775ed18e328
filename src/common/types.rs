use chrono::Utc;
use serde::{Deserialize, Serialize};

/// A saved contact. The phone number is the identity key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub name: String,
    #[serde(rename = "phoneNumber")]
    pub phone_number: String,
}

impl Contact {
    pub fn new(name: impl Into<String>, phone_number: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            phone_number: phone_number.into(),
        }
    }
}

/// A chat message as stored in the remote `messages` collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub sender: String,
    pub content: String,
    /// Epoch milliseconds, assigned by the sending side.
    pub timestamp: i64,
}

impl ChatMessage {
    pub fn new(sender: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            content: content.into(),
            timestamp: now_millis(),
        }
    }

    pub fn entry(&self) -> MessageEntry {
        MessageEntry {
            sender: self.sender.clone(),
            content: self.content.clone(),
        }
    }
}

/// What the chat view renders. Ordering comes from the snapshot itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageEntry {
    pub sender: String,
    pub content: String,
}

impl MessageEntry {
    pub fn new(sender: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Error,
}

/// Transient, dismissible message for the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub text: String,
}

impl Notice {
    pub fn info(text: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            text: text.into(),
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            text: text.into(),
        }
    }
}

/// Prefix a locally entered number with the selected country code,
/// e.g. `("+1", "555-0100")` -> `"+1 555-0100"`.
pub fn format_phone_number(country_code: Option<&str>, number: &str) -> String {
    let number = number.trim();
    match country_code.map(str::trim) {
        Some(code) if !code.is_empty() => format!("{code} {number}"),
        _ => number.to_string(),
    }
}

pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn country_code_is_prefixed_with_a_space() {
        assert_eq!(format_phone_number(Some("+1"), "555-0100"), "+1 555-0100");
        assert_eq!(format_phone_number(Some(" +39 "), " 333 "), "+39 333");
    }

    #[test]
    fn missing_country_code_keeps_number() {
        assert_eq!(format_phone_number(None, "555-0100"), "555-0100");
        assert_eq!(format_phone_number(Some(""), "555-0100"), "555-0100");
    }

    #[test]
    fn contact_serializes_with_remote_field_names() {
        let json = serde_json::to_value(Contact::new("Alice", "+1 555-0100")).unwrap();
        assert_eq!(json["name"], "Alice");
        assert_eq!(json["phoneNumber"], "+1 555-0100");
    }
}
