use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const WELCOME_MESSAGE: &str =
    "Hello! Ask me anything, or upload a document and ask questions about it.";

pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub enum Sender {
    #[serde(rename = "user")]
    User,
    #[serde(rename = "bot")]
    Bot,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub text: String,
    pub sender: Sender,
    #[serde(default)]
    pub is_error: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl Message {
    /// A message without an id yet. The store assigns one when it is
    /// added.
    pub fn new(sender: Sender, text: &str) -> Self {
        Message {
            id: String::new(),
            text: text.to_string(),
            sender,
            is_error: false,
            error_message: None,
        }
    }

    pub fn with_id(id: &str, sender: Sender, text: &str) -> Self {
        Message {
            id: id.to_string(),
            ..Message::new(sender, text)
        }
    }

    pub fn user(text: &str) -> Self {
        Message::new(Sender::User, text)
    }

    pub fn bot(text: &str) -> Self {
        Message::new(Sender::Bot, text)
    }

    /// A bot message flagging a failed request. `detail` is the
    /// diagnostic shown alongside it.
    pub fn error(text: &str, detail: &str) -> Self {
        Message {
            is_error: true,
            error_message: Some(detail.to_string()),
            ..Message::bot(text)
        }
    }

    pub fn apply(&mut self, patch: &MessagePatch) {
        if let Some(text) = &patch.text {
            self.text = text.clone();
        }
        if let Some(is_error) = patch.is_error {
            self.is_error = is_error;
        }
        if let Some(error_message) = &patch.error_message {
            self.error_message = error_message.clone();
        }
    }
}

/// Partial update merged into an existing message. `None` leaves the
/// field untouched; `error_message: Some(None)` clears it.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MessagePatch {
    pub text: Option<String>,
    pub is_error: Option<bool>,
    pub error_message: Option<Option<String>>,
}

impl MessagePatch {
    pub fn text(text: &str) -> Self {
        Self {
            text: Some(text.to_string()),
            ..Default::default()
        }
    }

    pub fn error(detail: &str) -> Self {
        Self {
            is_error: Some(true),
            error_message: Some(Some(detail.to_string())),
            ..Default::default()
        }
    }
}

/// A document the backend has indexed for retrieval. The
/// `document_session_id` is the backend's id, unrelated to the chat
/// session id.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DocumentDescriptor {
    pub document_session_id: String,
    pub filename: String,
    pub chunk_size: u32,
    pub chunk_overlap: u32,
    pub num_chunks: u32,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub name: String,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    pub messages: Vec<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document: Option<DocumentDescriptor>,
}

impl Session {
    /// A fresh session holding only the welcome message.
    pub fn bootstrap() -> Self {
        let now = Utc::now();
        let name = format!(
            "Session {}",
            now.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S")
        );
        let mut welcome = Message::bot(WELCOME_MESSAGE);
        welcome.id = new_id();

        Self {
            id: new_id(),
            name,
            created_at: now,
            messages: vec![welcome],
            document: None,
        }
    }

    pub fn position_of(&self, message_id: &str) -> Option<usize> {
        self.messages.iter().position(|m| m.id == message_id)
    }

    pub fn message(&self, message_id: &str) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == message_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_bootstraps_with_a_single_welcome_message() {
        let session = Session::bootstrap();
        assert!(session.name.starts_with("Session "));
        assert_eq!(session.messages.len(), 1);
        assert_eq!(session.messages[0].sender, Sender::Bot);
        assert!(!session.messages[0].id.is_empty());
        assert!(session.document.is_none());
    }

    #[test]
    fn it_applies_patches_field_by_field() {
        let mut msg = Message::with_id("1", Sender::Bot, "thinking");
        msg.apply(&MessagePatch::error("timeout"));
        assert_eq!(msg.text, "thinking");
        assert!(msg.is_error);
        assert_eq!(msg.error_message.as_deref(), Some("timeout"));

        msg.apply(&MessagePatch {
            text: Some("ok".to_string()),
            is_error: Some(false),
            error_message: Some(None),
        });
        assert_eq!(msg, Message::with_id("1", Sender::Bot, "ok"));
    }

    #[test]
    fn it_serializes_with_browser_field_names() {
        let msg = Message::error("Sorry", "boom");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["sender"], "bot");
        assert_eq!(json["isError"], true);
        assert_eq!(json["errorMessage"], "boom");
    }
}
