#[cfg(test)]
#[path = "message_test.rs"]
mod tests;

use chrono::Local;
use chrono::SecondsFormat;
use serde_derive::Deserialize;
use serde_derive::Serialize;

use super::Role;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageKind {
    Normal,
    Error,
}

/// One entry in a session's history. Immutable once appended to a session;
/// `size` is the character count used for context budgeting.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub text: String,
    kind: MessageKind,
    size: usize,
    pub timestamp: String,
}

impl Message {
    pub fn new(role: Role, text: &str) -> Message {
        return Message::new_with_kind(role, MessageKind::Normal, text);
    }

    pub fn new_with_kind(role: Role, kind: MessageKind, text: &str) -> Message {
        return Message {
            role,
            text: text.to_string(),
            kind,
            size: text.chars().count(),
            timestamp: Local::now().to_rfc3339_opts(SecondsFormat::Secs, false),
        };
    }

    pub fn kind(&self) -> MessageKind {
        return self.kind;
    }

    pub fn size(&self) -> usize {
        return self.size;
    }

    pub fn append(&mut self, text: &str) {
        self.text += text;
        self.size += text.chars().count();
    }
}
