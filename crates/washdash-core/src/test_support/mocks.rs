//! In-memory gateway for tests
//!
//! [`MockGateway`] keeps threads and messages in memory, records every call,
//! and replies to sends from a queue of [`ScriptedReply`]s. Like a real
//! backend it persists the user message and the assistant reply only once the
//! reply has fully streamed, so a broken or cancelled stream leaves the thread
//! untouched.
//!
//! ```rust
//! use washdash_core::test_support::{MockGateway, ScriptedReply};
//! use washdash_core::ChatGateway;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let gateway = MockGateway::new();
//! let thread_id = gateway.add_thread("Pump maintenance");
//! gateway.queue_reply(ScriptedReply::reply(&["Pump 3 ", "was serviced."]));
//!
//! let stream = gateway.send_message(&thread_id, "Status of pump 3?").await?;
//! let text = washdash_core::transport::collect_text(stream).await?;
//! assert_eq!(text, "Pump 3 was serviced.");
//! assert_eq!(gateway.stored_messages(&thread_id).len(), 2);
//! # Ok(())
//! # }
//! ```

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::error::{GatewayError, GatewayResult};
use crate::gateway::ChatGateway;
use crate::transport::{FragmentStream, TransportAdapter};
use crate::types::{Message, MessageRole, Thread};

/// Reply used when no reply was queued
pub const DEFAULT_REPLY: &str = "Acknowledged.";

/// A call observed by [`MockGateway`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayCall {
    ListThreads,
    GetThread(String),
    GetMessages(String),
    CreateThread(String),
    SendMessage { thread_id: String, content: String },
    DeleteThread(String),
}

/// How the next `send_message` answers
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    /// Stream these fragments, then complete
    Reply(Vec<String>),
    /// Stream these fragments, then break with `error`
    FailAfter {
        fragments: Vec<String>,
        error: GatewayError,
    },
    /// Reject the send before any stream exists
    Reject(GatewayError),
    /// Stream these fragments, then wait for `release` before completing
    Held {
        fragments: Vec<String>,
        release: Arc<Notify>,
    },
    /// Accept the send but never start a reply
    Unanswered,
}

impl ScriptedReply {
    pub fn reply(fragments: &[&str]) -> Self {
        Self::Reply(fragments.iter().map(|f| f.to_string()).collect())
    }

    pub fn fail_after(fragments: &[&str], error: GatewayError) -> Self {
        Self::FailAfter {
            fragments: fragments.iter().map(|f| f.to_string()).collect(),
            error,
        }
    }

    /// Held reply plus the handle that lets it finish
    pub fn held(fragments: &[&str]) -> (Self, Arc<Notify>) {
        let release = Arc::new(Notify::new());
        let reply = Self::Held {
            fragments: fragments.iter().map(|f| f.to_string()).collect(),
            release: Arc::clone(&release),
        };
        (reply, release)
    }
}

#[derive(Default)]
struct MockState {
    /// Listing order, most recently active first
    threads: Vec<Thread>,
    messages: HashMap<String, Vec<Message>>,
    replies: VecDeque<ScriptedReply>,
    calls: Vec<GatewayCall>,
    next_id: u64,
    fail_list: Option<GatewayError>,
    fail_get_thread: Option<GatewayError>,
    fail_messages: Option<GatewayError>,
    fail_create: Option<GatewayError>,
    fail_delete: Option<GatewayError>,
}

impl MockState {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}-{}", prefix, self.next_id)
    }

    fn has_thread(&self, thread_id: &str) -> bool {
        self.threads
            .iter()
            .any(|t| t.id.as_deref() == Some(thread_id))
    }

    /// Store a finished exchange and move its thread to the front
    fn persist_exchange(&mut self, thread_id: &str, content: &str, reply: &str) {
        let now = Utc::now();
        let user_id = self.next_id("msg");
        let reply_id = self.next_id("msg");
        let messages = self.messages.entry(thread_id.to_string()).or_default();
        messages.push(Message::persisted(user_id, MessageRole::User, content, now));
        messages.push(Message::persisted(reply_id, MessageRole::Assistant, reply, now));

        if let Some(pos) = self
            .threads
            .iter()
            .position(|t| t.id.as_deref() == Some(thread_id))
        {
            let mut thread = self.threads.remove(pos);
            thread.updated_at = now;
            self.threads.insert(0, thread);
        }
    }
}

fn not_found(thread_id: &str) -> GatewayError {
    GatewayError::status(404, format!("thread {} not found", thread_id))
}

enum Ending {
    Persist { gate: Option<Arc<Notify>> },
    Fail(GatewayError),
}

/// In-memory [`ChatGateway`] with call tracking and error injection
///
/// Clones share state, so a test can keep one handle while the controller
/// owns another.
#[derive(Clone, Default)]
pub struct MockGateway {
    state: Arc<Mutex<MockState>>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a thread at the end of the listing; returns its id
    pub fn add_thread(&self, title: &str) -> String {
        let mut state = self.state.lock();
        let id = state.next_id("thread");
        let now = Utc::now();
        state.threads.push(Thread {
            id: Some(id.clone()),
            title: Some(title.to_string()),
            created_at: now,
            updated_at: now,
        });
        state.messages.insert(id.clone(), Vec::new());
        id
    }

    /// Seed a persisted message
    pub fn add_message(&self, thread_id: &str, role: MessageRole, content: &str) -> String {
        let mut state = self.state.lock();
        let id = state.next_id("msg");
        let message = Message::persisted(id.clone(), role, content, Utc::now());
        state
            .messages
            .entry(thread_id.to_string())
            .or_default()
            .push(message);
        id
    }

    pub fn queue_reply(&self, reply: ScriptedReply) {
        self.state.lock().replies.push_back(reply);
    }

    pub fn fail_next_list(&self, error: GatewayError) {
        self.state.lock().fail_list = Some(error);
    }

    pub fn fail_next_get_thread(&self, error: GatewayError) {
        self.state.lock().fail_get_thread = Some(error);
    }

    pub fn fail_next_messages(&self, error: GatewayError) {
        self.state.lock().fail_messages = Some(error);
    }

    pub fn fail_next_create(&self, error: GatewayError) {
        self.state.lock().fail_create = Some(error);
    }

    pub fn fail_next_delete(&self, error: GatewayError) {
        self.state.lock().fail_delete = Some(error);
    }

    pub fn calls(&self) -> Vec<GatewayCall> {
        self.state.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    pub fn stored_messages(&self, thread_id: &str) -> Vec<Message> {
        self.state
            .lock()
            .messages
            .get(thread_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn thread_ids(&self) -> Vec<String> {
        self.state
            .lock()
            .threads
            .iter()
            .filter_map(|t| t.id.clone())
            .collect()
    }

    pub fn thread(&self, thread_id: &str) -> Option<Thread> {
        self.state
            .lock()
            .threads
            .iter()
            .find(|t| t.id.as_deref() == Some(thread_id))
            .cloned()
    }

    fn record(&self, call: GatewayCall) {
        self.state.lock().calls.push(call);
    }
}

#[async_trait]
impl ChatGateway for MockGateway {
    async fn list_threads(&self) -> GatewayResult<Vec<Thread>> {
        let mut state = self.state.lock();
        state.calls.push(GatewayCall::ListThreads);
        if let Some(error) = state.fail_list.take() {
            return Err(error);
        }
        Ok(state.threads.clone())
    }

    async fn get_thread(&self, thread_id: &str) -> GatewayResult<Thread> {
        let mut state = self.state.lock();
        state.calls.push(GatewayCall::GetThread(thread_id.to_string()));
        if let Some(error) = state.fail_get_thread.take() {
            return Err(error);
        }
        state
            .threads
            .iter()
            .find(|t| t.id.as_deref() == Some(thread_id))
            .cloned()
            .ok_or_else(|| not_found(thread_id))
    }

    async fn get_messages(&self, thread_id: &str) -> GatewayResult<Vec<Message>> {
        let mut state = self.state.lock();
        state.calls.push(GatewayCall::GetMessages(thread_id.to_string()));
        if let Some(error) = state.fail_messages.take() {
            return Err(error);
        }
        if !state.has_thread(thread_id) {
            return Err(not_found(thread_id));
        }
        Ok(state.messages.get(thread_id).cloned().unwrap_or_default())
    }

    async fn create_thread(&self, title_seed: &str) -> GatewayResult<Thread> {
        let mut state = self.state.lock();
        state
            .calls
            .push(GatewayCall::CreateThread(title_seed.to_string()));
        if let Some(error) = state.fail_create.take() {
            return Err(error);
        }

        let id = state.next_id("thread");
        let now = Utc::now();
        let thread = Thread {
            id: Some(id.clone()),
            title: Some(title_seed.to_string()),
            created_at: now,
            updated_at: now,
        };
        state.threads.insert(0, thread.clone());
        state.messages.insert(id, Vec::new());
        Ok(thread)
    }

    async fn send_message(&self, thread_id: &str, content: &str) -> GatewayResult<FragmentStream> {
        self.record(GatewayCall::SendMessage {
            thread_id: thread_id.to_string(),
            content: content.to_string(),
        });

        let reply = {
            let mut state = self.state.lock();
            if !state.has_thread(thread_id) {
                return Err(not_found(thread_id));
            }
            state
                .replies
                .pop_front()
                .unwrap_or_else(|| ScriptedReply::reply(&[DEFAULT_REPLY]))
        };

        let (fragments, ending) = match reply {
            ScriptedReply::Reject(error) => return Err(error),
            ScriptedReply::Unanswered => return std::future::pending().await,
            ScriptedReply::Reply(fragments) => (fragments, Ending::Persist { gate: None }),
            ScriptedReply::Held { fragments, release } => (
                fragments,
                Ending::Persist {
                    gate: Some(release),
                },
            ),
            ScriptedReply::FailAfter { fragments, error } => (fragments, Ending::Fail(error)),
        };

        let state = Arc::clone(&self.state);
        let thread_id = thread_id.to_string();
        let content = content.to_string();

        let chunks = async_stream::stream! {
            for fragment in &fragments {
                yield Ok(fragment.clone());
            }
            match ending {
                Ending::Persist { gate } => {
                    if let Some(gate) = gate {
                        gate.notified().await;
                    }
                    state
                        .lock()
                        .persist_exchange(&thread_id, &content, &fragments.concat());
                }
                Ending::Fail(error) => yield Err(error),
            }
        };

        Ok(TransportAdapter::from_chunks(chunks))
    }

    async fn delete_thread(&self, thread_id: &str) -> GatewayResult<()> {
        let mut state = self.state.lock();
        state
            .calls
            .push(GatewayCall::DeleteThread(thread_id.to_string()));
        if let Some(error) = state.fail_delete.take() {
            return Err(error);
        }
        if !state.has_thread(thread_id) {
            return Err(not_found(thread_id));
        }
        state
            .threads
            .retain(|t| t.id.as_deref() != Some(thread_id));
        state.messages.remove(thread_id);
        Ok(())
    }

    fn gateway_name(&self) -> &str {
        "mock"
    }
}
