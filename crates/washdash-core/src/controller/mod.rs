//! Thread lifecycle controller
//!
//! The state machine behind the assistant chat surfaces. One controller per
//! chat context (window, session); all of its state is owned here and the
//! presentation layer only reads [`ChatSnapshot`]s and issues intents.
//!
//! ```text
//! Idle --start_new_chat--> Draft --send (create thread)--> Active(id)
//!  |                         ^                               |  ^
//!  `----select_thread--------|------------------------------>'  |
//!                            `--delete last thread--  Active --send--> [sending] --terminal--'
//! ```
//!
//! Sending is orthogonal to the phase: at most one send is in flight at a
//! time, and while it is, switching threads, starting a new chat or sending
//! again are rejected with [`ChatError::Busy`].
//!
//! The controller never edits gateway records. After a send completes it
//! marks the thread dirty in the cache and re-reads the gateway's message
//! list, which replaces the local user message and the streamed text.

mod snapshot;


pub use snapshot::{ChatPhase, ChatSnapshot};

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use washdash_config::AssistantConfig;

use crate::accumulator::{wait_until, CancelHandle, StreamObserver, StreamOutcome, StreamingSession};
use crate::cache::ThreadCache;
use crate::error::{ChatError, ChatResult, GatewayError};
use crate::gateway::ChatGateway;
use crate::types::{derive_title, Message, Thread};

/// Tunables for a [`ThreadController`]
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerSettings {
    /// Freshness window for cached thread and message lists
    pub cache_ttl: Duration,
    /// Characters of the first message used as a new thread's title
    pub title_max_chars: usize,
    /// Cancel a reply that has not completed within this time
    pub response_timeout: Option<Duration>,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self::from(&AssistantConfig::default())
    }
}

impl From<&AssistantConfig> for ControllerSettings {
    fn from(config: &AssistantConfig) -> Self {
        Self {
            cache_ttl: config.cache.ttl(),
            title_max_chars: config.chat.title_max_chars,
            response_timeout: config.chat.response_timeout(),
        }
    }
}

/// Successful end of [`ThreadController::send_message`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// Reply streamed to completion and the thread was re-read
    Completed { thread_id: String, reply: String },
    /// User cancelled; streamed text was discarded
    Cancelled { thread_id: Option<String> },
}

/// The single in-flight send
#[derive(Debug)]
struct InFlight {
    send_id: u64,
    /// `None` while the draft is still being created on the gateway
    thread_id: Option<String>,
    text: String,
    started_at: DateTime<Utc>,
    cancel: CancelHandle,
}

#[derive(Debug)]
struct ControllerState {
    phase: ChatPhase,
    /// Messages not confirmed by the gateway: draft queue or the pending user message
    local_messages: Vec<Message>,
    in_flight: Option<InFlight>,
    cache: ThreadCache,
    last_error: Option<ChatError>,
    unsent_input: Option<String>,
    stale: bool,
    next_send_id: u64,
}

impl ControllerState {
    fn new(cache_ttl: Duration) -> Self {
        Self {
            phase: ChatPhase::Idle,
            local_messages: Vec::new(),
            in_flight: None,
            cache: ThreadCache::new(cache_ttl),
            last_error: None,
            unsent_input: None,
            stale: false,
            next_send_id: 0,
        }
    }

    fn reject_if_sending(&self) -> ChatResult<()> {
        if self.in_flight.is_some() {
            Err(ChatError::Busy)
        } else {
            Ok(())
        }
    }

    fn enter_draft(&mut self) {
        self.phase = ChatPhase::Draft;
        self.local_messages.clear();
        self.unsent_input = None;
        self.last_error = None;
    }

    fn enter_thread(&mut self, thread_id: &str) {
        self.phase = ChatPhase::Active {
            thread_id: thread_id.to_string(),
        };
        self.local_messages.clear();
        self.unsent_input = None;
        self.last_error = None;
    }

    fn try_enter_draft(&mut self) -> ChatResult<()> {
        self.reject_if_sending()?;
        self.enter_draft();
        Ok(())
    }

    fn try_enter_thread(&mut self, thread_id: &str) -> ChatResult<()> {
        self.reject_if_sending()?;
        self.enter_thread(thread_id);
        Ok(())
    }

    /// Claim the single-flight slot for `content`
    fn begin_send(&mut self, content: &str) -> ChatResult<(u64, Option<String>, CancelHandle)> {
        self.reject_if_sending()?;

        let target = match &self.phase {
            ChatPhase::Active { thread_id } => Some(thread_id.clone()),
            ChatPhase::Draft => None,
            ChatPhase::Idle => {
                self.enter_draft();
                None
            }
        };

        self.next_send_id += 1;
        let send_id = self.next_send_id;
        let cancel = CancelHandle::new();
        self.in_flight = Some(InFlight {
            send_id,
            thread_id: target.clone(),
            text: String::new(),
            started_at: Utc::now(),
            cancel: cancel.clone(),
        });
        self.local_messages.push(Message::local_user(content));
        self.last_error = None;
        self.unsent_input = None;

        Ok((send_id, target, cancel))
    }

    fn owns_flight(&self, send_id: u64) -> bool {
        self.in_flight
            .as_ref()
            .is_some_and(|flight| flight.send_id == send_id)
    }

    /// Release the single-flight slot and roll back unconfirmed messages
    fn end_send(&mut self) {
        self.in_flight = None;
        self.local_messages.clear();
    }

    fn snapshot(&self) -> ChatSnapshot {
        let mut messages = match &self.phase {
            ChatPhase::Active { thread_id } => self.cache.messages(thread_id).any().unwrap_or_default(),
            ChatPhase::Draft | ChatPhase::Idle => Vec::new(),
        };
        messages.extend(self.local_messages.iter().cloned());

        let streaming_text = self.in_flight.as_ref().map(|flight| flight.text.clone());
        if let Some(flight) = &self.in_flight {
            let mut placeholder = Message::streaming_assistant(flight.text.clone());
            placeholder.timestamp = flight.started_at;
            messages.push(placeholder);
        }

        ChatSnapshot {
            phase: self.phase.clone(),
            sending: self.in_flight.is_some(),
            threads: self.cache.threads().any().unwrap_or_default(),
            messages,
            streaming_text,
            last_error: self.last_error.clone(),
            unsent_input: self.unsent_input.clone(),
            stale: self.stale,
        }
    }
}

/// Draft/active/sending state machine over a [`ChatGateway`]
pub struct ThreadController {
    gateway: Arc<dyn ChatGateway>,
    settings: ControllerSettings,
    state: Mutex<ControllerState>,
    snapshot_tx: watch::Sender<ChatSnapshot>,
}

impl ThreadController {
    pub fn new(gateway: Arc<dyn ChatGateway>, settings: ControllerSettings) -> Self {
        let state = ControllerState::new(settings.cache_ttl);
        let (snapshot_tx, _) = watch::channel(state.snapshot());
        Self {
            gateway,
            settings,
            state: Mutex::new(state),
            snapshot_tx,
        }
    }

    pub fn from_config(gateway: Arc<dyn ChatGateway>, config: &AssistantConfig) -> Self {
        Self::new(gateway, ControllerSettings::from(config))
    }

    pub fn settings(&self) -> &ControllerSettings {
        &self.settings
    }

    /// Receiver that observes a new snapshot after every transition and fragment
    ///
    /// Snapshots are published under the controller lock: release a
    /// `borrow()` before calling back into the controller.
    pub fn subscribe(&self) -> watch::Receiver<ChatSnapshot> {
        self.snapshot_tx.subscribe()
    }

    pub fn snapshot(&self) -> ChatSnapshot {
        self.read(ControllerState::snapshot)
    }

    pub fn phase(&self) -> ChatPhase {
        self.read(|s| s.phase.clone())
    }

    pub fn is_sending(&self) -> bool {
        self.read(|s| s.in_flight.is_some())
    }

    /// Load the thread list and pick a starting point
    ///
    /// With no threads the controller enters a draft; otherwise the first
    /// listed (most recent) thread becomes active.
    pub async fn open(&self) -> ChatResult<()> {
        self.read(ControllerState::reject_if_sending)?;

        let threads = self.load_threads(false).await?;
        match threads.iter().find_map(|t| t.id.clone()) {
            Some(thread_id) => self.select_thread(&thread_id).await,
            None => {
                self.update(ControllerState::try_enter_draft)?;
                info!("No conversations yet, starting a draft");
                Ok(())
            }
        }
    }

    /// Begin a new conversation locally; nothing is created on the gateway
    pub fn start_new_chat(&self) -> ChatResult<()> {
        self.update(ControllerState::try_enter_draft)?;
        debug!("Started draft conversation");
        Ok(())
    }

    /// Make `thread_id` the active thread and load its messages
    pub async fn select_thread(&self, thread_id: &str) -> ChatResult<()> {
        self.read(ControllerState::reject_if_sending)?;

        if !self.read(|s| s.cache.knows_thread(thread_id)) {
            match self.gateway.get_thread(thread_id).await {
                Ok(thread) => self.update(|s| s.cache.upsert_thread(thread)),
                Err(e) => return Err(self.record_failure(ChatError::FetchFailure(e))),
            }
        }

        self.update(|s| s.try_enter_thread(thread_id))?;
        debug!(thread_id, "Selected thread");

        self.load_messages(thread_id, false).await.map(|_| ())
    }

    /// Send `content` in the current conversation and stream the reply
    ///
    /// From a draft, the thread is created first (titled with a prefix of
    /// `content`) and becomes active before the message is sent. Returns once
    /// the reply reached a terminal state and the thread was re-read.
    ///
    /// Cancellation and the response timeout cover the whole wait from the
    /// moment the message is handed to the gateway, including the wait for
    /// the reply to start.
    pub async fn send_message(&self, content: &str) -> ChatResult<SendOutcome> {
        let content = content.trim();
        if content.is_empty() {
            return Err(ChatError::EmptyMessage);
        }

        let (send_id, target, cancel) = self.update(|s| s.begin_send(content))?;
        let _release = FlightRelease {
            controller: self,
            send_id,
        };

        let thread_id = match target {
            Some(thread_id) => thread_id,
            None => self.promote_draft(content).await?,
        };

        let response_timeout = self.settings.response_timeout;
        let started_at = Instant::now();
        let deadline = response_timeout.map(|t| started_at + t);

        info!(thread_id = %thread_id, "Sending message");
        let sent = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(self.finish_cancelled(thread_id.clone())),
            _ = wait_until(deadline) => {
                cancel.cancel();
                let timeout = response_timeout.unwrap_or_default();
                return Err(self.finish_timed_out(&thread_id, timeout));
            }
            sent = self.gateway.send_message(&thread_id, content) => sent,
        };
        let stream = match sent {
            Ok(stream) => stream,
            Err(e) => return Err(self.fail_send(content, ChatError::SendFailure(e))),
        };

        let session = StreamingSession::with_cancel_handle(Some(thread_id.clone()), cancel)
            .with_timeout(response_timeout)
            .timed_from(started_at);
        let mut publisher = SnapshotPublisher { controller: self };

        match session.attach(stream, &mut publisher).await {
            StreamOutcome::Completed(reply) => {
                self.reconcile(&thread_id).await;
                Ok(SendOutcome::Completed { thread_id, reply })
            }
            StreamOutcome::Failed(e) => Err(self.fail_send(content, ChatError::SendFailure(e))),
            StreamOutcome::TimedOut(timeout) => Err(self.finish_timed_out(&thread_id, timeout)),
            StreamOutcome::Cancelled => Ok(self.finish_cancelled(thread_id)),
        }
    }

    /// Abort the in-flight reply, if any
    ///
    /// Server-side generation is not cancelled.
    pub fn cancel_stream(&self) -> bool {
        match self.read(|s| s.in_flight.as_ref().map(|flight| flight.cancel.clone())) {
            Some(handle) => {
                info!("Cancelling in-flight reply");
                handle.cancel();
                true
            }
            None => false,
        }
    }

    /// Delete a thread on the gateway
    ///
    /// If it was the active thread, the first remaining thread becomes active,
    /// or a draft is started when none remain.
    pub async fn delete_thread(&self, thread_id: &str) -> ChatResult<()> {
        self.read(|s| match &s.in_flight {
            Some(flight) if flight.thread_id.as_deref() == Some(thread_id) => Err(ChatError::Busy),
            _ => Ok(()),
        })?;

        if let Err(e) = self.gateway.delete_thread(thread_id).await {
            let error = ChatError::DeleteFailure(e);
            warn!(thread_id, error = %error, "Thread deletion failed");
            self.update(|s| s.last_error = Some(error.clone()));
            return Err(error);
        }
        info!(thread_id, "Thread deleted");

        let was_active = self.update(|s| {
            s.cache.remove_thread(thread_id);
            s.phase.active_thread_id() == Some(thread_id) && s.in_flight.is_none()
        });
        if !was_active {
            return Ok(());
        }

        let remaining = match self.load_threads(true).await {
            Ok(threads) => threads,
            Err(_) => self.read(|s| s.cache.threads().any().unwrap_or_default()),
        };
        let next = remaining
            .iter()
            .filter_map(|t| t.id.as_deref())
            .find(|id| *id != thread_id)
            .map(str::to_string);

        match next {
            Some(next) => {
                if let Err(e) = self.select_thread(&next).await {
                    debug!(thread_id = %next, error = %e, "Could not load next thread after delete");
                }
            }
            None => self.update(|s| {
                if s.in_flight.is_none() {
                    s.enter_draft();
                }
            }),
        }
        Ok(())
    }

    /// Thread list, read through the cache
    pub async fn threads(&self) -> ChatResult<Vec<Thread>> {
        self.load_threads(false).await
    }

    /// Messages of the current conversation, read through the cache
    ///
    /// For a draft these are the local messages only.
    pub async fn messages(&self) -> ChatResult<Vec<Message>> {
        match self.read(|s| s.phase.active_thread_id().map(str::to_string)) {
            Some(thread_id) => self.load_messages(&thread_id, false).await,
            None => Ok(self.read(|s| s.local_messages.clone())),
        }
    }

    /// Re-fetch the thread list regardless of freshness
    pub async fn refresh_threads(&self) -> ChatResult<Vec<Thread>> {
        self.load_threads(true).await
    }

    /// Re-fetch the active thread's messages regardless of freshness
    pub async fn refresh_messages(&self) -> ChatResult<Vec<Message>> {
        match self.read(|s| s.phase.active_thread_id().map(str::to_string)) {
            Some(thread_id) => self.load_messages(&thread_id, true).await,
            None => Ok(self.read(|s| s.local_messages.clone())),
        }
    }

    /// Dismiss the last reported error
    pub fn clear_error(&self) {
        self.update(|s| s.last_error = None);
    }

    async fn promote_draft(&self, content: &str) -> ChatResult<String> {
        let title = derive_title(content, self.settings.title_max_chars);
        debug!(title = %title, "Creating thread for draft conversation");

        let created = self
            .gateway
            .create_thread(&title)
            .await
            .and_then(|thread| match thread.id.clone() {
                Some(id) => Ok((id, thread)),
                None => Err(GatewayError::malformed("created thread has no id")),
            });

        match created {
            Ok((thread_id, thread)) => {
                self.update(|s| {
                    s.phase = ChatPhase::Active {
                        thread_id: thread_id.clone(),
                    };
                    if let Some(flight) = s.in_flight.as_mut() {
                        flight.thread_id = Some(thread_id.clone());
                    }
                    s.cache.upsert_thread(thread);
                    s.cache.invalidate_threads();
                });
                info!(thread_id = %thread_id, "Draft promoted to thread");
                Ok(thread_id)
            }
            Err(e) => {
                let error = ChatError::CreationFailure(e);
                warn!(error = %error, "Thread creation failed, keeping draft");
                self.update(|s| {
                    s.end_send();
                    s.phase = ChatPhase::Draft;
                    s.unsent_input = Some(content.to_string());
                    s.last_error = Some(error.clone());
                });
                Err(error)
            }
        }
    }

    /// Replace local state with the gateway's view after a completed reply
    async fn reconcile(&self, thread_id: &str) {
        self.update(|s| s.cache.invalidate_thread(thread_id));

        let fetched = self.gateway.get_messages(thread_id).await;
        if let Err(e) = &fetched {
            warn!(thread_id, error = %e, "Could not re-read thread after reply");
        }

        self.update(|s| {
            s.end_send();
            match fetched {
                Ok(messages) => {
                    s.cache.store_messages(thread_id, messages);
                    s.stale = false;
                }
                Err(e) => {
                    s.stale = true;
                    s.last_error = Some(ChatError::FetchFailure(e));
                }
            }
        });

        if let Err(e) = self.load_threads(true).await {
            debug!(error = %e, "Thread list refresh after reply failed");
        }
    }

    fn fail_send(&self, content: &str, error: ChatError) -> ChatError {
        warn!(error = %error, "Send failed, discarding streamed text");
        self.update(|s| {
            s.end_send();
            s.unsent_input = Some(content.to_string());
            s.last_error = Some(error.clone());
        });
        error
    }

    /// The gateway accepted the message and may still finish the reply, so
    /// the text is not offered for resending and the thread is re-read later
    fn finish_timed_out(&self, thread_id: &str, timeout: Duration) -> ChatError {
        let error = ChatError::SendFailure(GatewayError::Timeout(timeout));
        warn!(thread_id, ?timeout, "Reply timed out, discarding streamed text");
        self.update(|s| {
            s.end_send();
            s.cache.invalidate_thread(thread_id);
            s.last_error = Some(error.clone());
        });
        error
    }

    fn finish_cancelled(&self, thread_id: String) -> SendOutcome {
        self.update(|s| {
            s.end_send();
            s.cache.invalidate_thread(&thread_id);
        });
        SendOutcome::Cancelled {
            thread_id: Some(thread_id),
        }
    }

    async fn load_threads(&self, force: bool) -> ChatResult<Vec<Thread>> {
        if !force {
            if let Some(threads) = self.read(|s| s.cache.threads().fresh()) {
                return Ok(threads);
            }
        }

        match self.gateway.list_threads().await {
            Ok(threads) => {
                let threads: Vec<Thread> = threads.into_iter().filter(|t| !t.is_draft()).collect();
                debug!(count = threads.len(), "Fetched thread list");
                self.update(|s| s.cache.store_threads(threads.clone()));
                Ok(threads)
            }
            Err(e) => Err(self.record_failure(ChatError::FetchFailure(e))),
        }
    }

    async fn load_messages(&self, thread_id: &str, force: bool) -> ChatResult<Vec<Message>> {
        if !force {
            if let Some(messages) = self.read(|s| s.cache.messages(thread_id).fresh()) {
                return Ok(messages);
            }
        }

        match self.gateway.get_messages(thread_id).await {
            Ok(messages) => {
                debug!(thread_id, count = messages.len(), "Fetched messages");
                self.update(|s| {
                    s.cache.store_messages(thread_id, messages.clone());
                    s.stale = false;
                });
                Ok(messages)
            }
            Err(e) => Err(self.record_failure(ChatError::FetchFailure(e))),
        }
    }

    fn record_failure(&self, error: ChatError) -> ChatError {
        warn!(error = %error, "Chat operation failed");
        self.update(|s| {
            if matches!(error, ChatError::FetchFailure(_)) {
                s.stale = true;
            }
            s.last_error = Some(error.clone());
        });
        error
    }

    fn read<R>(&self, f: impl FnOnce(&ControllerState) -> R) -> R {
        f(&self.state.lock())
    }

    /// Mutate state and publish the resulting snapshot
    ///
    /// Publishing happens under the lock so snapshots go out in mutation order.
    fn update<R>(&self, f: impl FnOnce(&mut ControllerState) -> R) -> R {
        let mut state = self.state.lock();
        let result = f(&mut state);
        self.snapshot_tx.send_replace(state.snapshot());
        result
    }
}

/// Frees the single-flight slot if a send future is dropped before finishing
///
/// The message may already be on the gateway, so the thread is marked dirty.
struct FlightRelease<'a> {
    controller: &'a ThreadController,
    send_id: u64,
}

impl Drop for FlightRelease<'_> {
    fn drop(&mut self) {
        let send_id = self.send_id;
        let owned = self.controller.read(|s| s.owns_flight(send_id));
        if owned {
            debug!(send_id, "Send abandoned before completion");
            self.controller.update(|s| {
                if !s.owns_flight(send_id) {
                    return;
                }
                let thread_id = s.in_flight.as_ref().and_then(|f| f.thread_id.clone());
                if let Some(thread_id) = thread_id {
                    s.cache.invalidate_thread(&thread_id);
                }
                s.end_send();
            });
        }
    }
}

/// Mirrors accumulated reply text into controller state
struct SnapshotPublisher<'a> {
    controller: &'a ThreadController,
}

impl StreamObserver for SnapshotPublisher<'_> {
    fn on_fragment(&mut self, running_text: &str) {
        self.controller.update(|s| {
            if let Some(flight) = s.in_flight.as_mut() {
                flight.text.clear();
                flight.text.push_str(running_text);
            }
        });
    }

    fn on_complete(&mut self, final_text: &str) {
        debug!(chars = final_text.chars().count(), "Reply accumulated");
    }

    fn on_error(&mut self, error: &GatewayError) {
        debug!(error = %error, "Reply stream reported an error");
    }
}
