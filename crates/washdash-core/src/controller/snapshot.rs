//! Read model handed to the presentation layer

use serde::Serialize;

use crate::error::ChatError;
use crate::types::{Message, Thread};

/// Which conversation the controller is showing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ChatPhase {
    /// Nothing selected, nothing drafted
    Idle,
    /// New conversation that does not exist on the gateway yet
    Draft,
    /// Persisted thread selected
    Active { thread_id: String },
}

impl ChatPhase {
    pub fn active_thread_id(&self) -> Option<&str> {
        match self {
            ChatPhase::Active { thread_id } => Some(thread_id),
            _ => None,
        }
    }

    pub fn is_draft(&self) -> bool {
        matches!(self, ChatPhase::Draft)
    }
}

/// Point-in-time view of the controller
///
/// `messages` is already merged: gateway history for the active thread, then
/// local messages not yet confirmed, then the streaming assistant placeholder
/// while a reply is in flight.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatSnapshot {
    pub phase: ChatPhase,
    /// A send is in flight (thread creation included)
    pub sending: bool,
    pub threads: Vec<Thread>,
    pub messages: Vec<Message>,
    /// Accumulated reply text while streaming
    pub streaming_text: Option<String>,
    pub last_error: Option<ChatError>,
    /// Text of a send that failed, so the input box can be refilled
    pub unsent_input: Option<String>,
    /// A fetch failed since messages were last loaded; displayed data may be outdated
    pub stale: bool,
}

impl Default for ChatSnapshot {
    fn default() -> Self {
        Self {
            phase: ChatPhase::Idle,
            sending: false,
            threads: Vec::new(),
            messages: Vec::new(),
            streaming_text: None,
            last_error: None,
            unsent_input: None,
            stale: false,
        }
    }
}

impl ChatSnapshot {
    pub fn streaming_message(&self) -> Option<&Message> {
        self.messages.iter().find(|m| m.is_streaming)
    }

    pub fn active_thread(&self) -> Option<&Thread> {
        let id = self.phase.active_thread_id()?;
        self.threads.iter().find(|t| t.id.as_deref() == Some(id))
    }
}
