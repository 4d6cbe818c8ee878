//! Thread and message records
//!
//! Field names follow the gateway's snake_case JSON; camelCase aliases are
//! accepted on input.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Title shown for a thread the gateway returned without one
pub const UNTITLED_THREAD: &str = "New chat";

/// Author of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
            MessageRole::System => "system",
        }
    }
}

/// A conversation container
///
/// `id` is assigned by the gateway. A thread without an id is a local draft;
/// it is never persisted and never leaves the controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thread {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(alias = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(alias = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

impl Thread {
    /// A local draft with no server id
    pub fn draft(now: DateTime<Utc>) -> Self {
        Self {
            id: None,
            title: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_draft(&self) -> bool {
        self.id.is_none()
    }

    pub fn display_title(&self) -> &str {
        match self.title.as_deref() {
            Some(title) if !title.is_empty() => title,
            _ => UNTITLED_THREAD,
        }
    }
}

/// One chat message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Absent until the message has round-tripped through the gateway
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub role: MessageRole,
    #[serde(default)]
    pub content: String,
    #[serde(alias = "created_at", alias = "createdAt")]
    pub timestamp: DateTime<Utc>,
    /// Set only on the assistant placeholder that is currently receiving fragments
    #[serde(default)]
    pub is_streaming: bool,
}

impl Message {
    /// User message typed locally, not yet confirmed by the gateway
    pub fn local_user(content: impl Into<String>) -> Self {
        Self {
            id: None,
            role: MessageRole::User,
            content: content.into(),
            timestamp: Utc::now(),
            is_streaming: false,
        }
    }

    /// Placeholder for the assistant reply being accumulated
    pub fn streaming_assistant(content: impl Into<String>) -> Self {
        Self {
            id: None,
            role: MessageRole::Assistant,
            content: content.into(),
            timestamp: Utc::now(),
            is_streaming: true,
        }
    }

    /// Message as stored by the gateway
    pub fn persisted(
        id: impl Into<String>,
        role: MessageRole,
        content: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Some(id.into()),
            role,
            content: content.into(),
            timestamp,
            is_streaming: false,
        }
    }

    pub fn is_local(&self) -> bool {
        self.id.is_none()
    }
}

/// Thread title for a conversation started with `first_message`
///
/// The first `max_chars` characters, verbatim: no trimming and no ellipsis.
pub fn derive_title(first_message: &str, max_chars: usize) -> String {
    first_message.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_title_truncates_to_char_count() {
        assert_eq!(
            derive_title("What is the chlorine stock level?", 20),
            "What is the chlorine"
        );
    }

    #[test]
    fn test_derive_title_short_message_unchanged() {
        assert_eq!(derive_title("Hi", 20), "Hi");
    }

    #[test]
    fn test_derive_title_keeps_whitespace_verbatim() {
        assert_eq!(derive_title("  leading", 4), "  le");
    }

    #[test]
    fn test_derive_title_counts_chars_not_bytes() {
        assert_eq!(derive_title("Ñandú água potável", 5), "Ñandú");
    }

    #[test]
    fn test_thread_deserializes_camel_case() {
        let json = r#"{
            "id": "t1",
            "title": "Borehole repairs",
            "createdAt": "2026-03-01T08:00:00Z",
            "updatedAt": "2026-03-01T09:30:00Z"
        }"#;
        let thread: Thread = serde_json::from_str(json).unwrap();
        assert_eq!(thread.id.as_deref(), Some("t1"));
        assert!(thread.updated_at > thread.created_at);
    }

    #[test]
    fn test_untitled_thread_display() {
        let thread = Thread::draft(Utc::now());
        assert!(thread.is_draft());
        assert_eq!(thread.display_title(), UNTITLED_THREAD);
    }

    #[test]
    fn test_message_role_wire_format() {
        let json = r#"{"id":"m1","role":"assistant","content":"Stock is 40kg","created_at":"2026-03-01T08:00:00Z"}"#;
        let message: Message = serde_json::from_str(json).unwrap();
        assert_eq!(message.role, MessageRole::Assistant);
        assert!(!message.is_streaming);
        assert!(!message.is_local());
        assert_eq!(serde_json::to_value(MessageRole::System).unwrap(), "system");
    }

    #[test]
    fn test_local_messages_have_no_id() {
        assert!(Message::local_user("hello").is_local());
        let placeholder = Message::streaming_assistant("");
        assert!(placeholder.is_streaming);
        assert_eq!(placeholder.role, MessageRole::Assistant);
    }
}
