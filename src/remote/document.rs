//! Mapping between domain records and Firestore REST documents.
//!
//! Firestore wraps every field in a typed value, e.g.
//! `{"fields": {"name": {"stringValue": "Alice"}, "timestamp": {"integerValue": "1700000000000"}}}`.
//! Integers travel as decimal strings.

use serde_json::{Value, json};

use crate::common::{ChatMessage, Contact};

pub fn contact_document(contact: &Contact) -> Value {
    json!({
        "fields": {
            "name": { "stringValue": contact.name },
            "phoneNumber": { "stringValue": contact.phone_number },
        }
    })
}

pub fn message_document(message: &ChatMessage) -> Value {
    json!({
        "fields": {
            "sender": { "stringValue": message.sender },
            "content": { "stringValue": message.content },
            "timestamp": { "integerValue": message.timestamp.to_string() },
        }
    })
}

/// `None` when either required field is missing or not a string.
pub fn parse_contact(document: &Value) -> Option<Contact> {
    let name = string_field(document, "name")?;
    let phone_number = string_field(document, "phoneNumber")?;
    Some(Contact { name, phone_number })
}

/// `None` when `sender` or `content` is missing. A missing timestamp reads as 0.
pub fn parse_message(document: &Value) -> Option<ChatMessage> {
    let sender = string_field(document, "sender")?;
    let content = string_field(document, "content")?;
    let timestamp = integer_field(document, "timestamp").unwrap_or(0);
    Some(ChatMessage {
        sender,
        content,
        timestamp,
    })
}

fn field<'a>(document: &'a Value, name: &str) -> Option<&'a Value> {
    document.get("fields")?.get(name)
}

fn string_field(document: &Value, name: &str) -> Option<String> {
    field(document, name)?
        .get("stringValue")?
        .as_str()
        .map(str::to_string)
}

fn integer_field(document: &Value, name: &str) -> Option<i64> {
    let value = field(document, name)?;
    if let Some(raw) = value.get("integerValue") {
        return match raw {
            Value::String(text) => text.parse().ok(),
            other => other.as_i64(),
        };
    }
    value.get("doubleValue")?.as_f64().map(|v| v as i64)
}
