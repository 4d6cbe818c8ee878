//! Stream accumulator
//!
//! A [`StreamingSession`] consumes one [`FragmentStream`] and reports to a
//! [`StreamObserver`]:
//!
//! - `on_fragment(running_text)` once per fragment, in order, with the
//!   cumulative text so far
//! - `on_complete(final_text)` exactly once after the last fragment, where
//!   `final_text` equals the last running text
//! - `on_error(error)` at most once, never together with `on_complete`
//!
//! ```text
//! Streaming --Complete--> Completed
//!     |------Err--------> Failed
//!     |------cancel-----> Cancelled   (no further callbacks)
//!     `------deadline---> Cancelled   (reported as TimedOut)
//! ```
//!
//! `attach` takes the session by value, so a session delivers to exactly one
//! observer and nothing fires after its terminal state. The terminal state is
//! read from the returned [`StreamOutcome`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::GatewayError;
use crate::transport::{FragmentStream, TransportEvent};

/// Receiver of accumulation events
pub trait StreamObserver {
    fn on_fragment(&mut self, running_text: &str);

    fn on_complete(&mut self, final_text: &str);

    fn on_error(&mut self, error: &GatewayError);
}

/// Closure-backed observer
pub struct StreamCallbacks<F, C, E>
where
    F: FnMut(&str),
    C: FnMut(&str),
    E: FnMut(&GatewayError),
{
    pub on_fragment: F,
    pub on_complete: C,
    pub on_error: E,
}

impl<F, C, E> StreamObserver for StreamCallbacks<F, C, E>
where
    F: FnMut(&str),
    C: FnMut(&str),
    E: FnMut(&GatewayError),
{
    fn on_fragment(&mut self, running_text: &str) {
        (self.on_fragment)(running_text)
    }

    fn on_complete(&mut self, final_text: &str) {
        (self.on_complete)(final_text)
    }

    fn on_error(&mut self, error: &GatewayError) {
        (self.on_error)(error)
    }
}

/// Shared cancellation flag for a session
///
/// Cloning shares the flag. Cancelling is idempotent and wakes a session that
/// is waiting for its next fragment.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    inner: Arc<CancelInner>,
}

#[derive(Debug, Default)]
struct CancelInner {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        if !self.inner.cancelled.swap(true, Ordering::SeqCst) {
            self.inner.notify.notify_waiters();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once [`CancelHandle::cancel`] has been called
    pub async fn cancelled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

/// Lifecycle state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Streaming,
    Completed,
    Failed,
    Cancelled,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SessionState::Streaming)
    }
}

/// How a session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamOutcome {
    Completed(String),
    Failed(GatewayError),
    Cancelled,
    /// Deadline passed; the session was cancelled
    TimedOut(Duration),
}

impl StreamOutcome {
    pub fn state(&self) -> SessionState {
        match self {
            StreamOutcome::Completed(_) => SessionState::Completed,
            StreamOutcome::Failed(_) => SessionState::Failed,
            StreamOutcome::Cancelled | StreamOutcome::TimedOut(_) => SessionState::Cancelled,
        }
    }
}

/// One in-flight assistant reply
#[derive(Debug)]
pub struct StreamingSession {
    thread_id: Option<String>,
    text: String,
    fragments: usize,
    cancel: CancelHandle,
    timeout: Option<Duration>,
    started_at: Option<Instant>,
}

impl StreamingSession {
    pub fn new(thread_id: Option<String>) -> Self {
        Self::with_cancel_handle(thread_id, CancelHandle::new())
    }

    /// Session controlled by an existing cancel handle
    pub fn with_cancel_handle(thread_id: Option<String>, cancel: CancelHandle) -> Self {
        Self {
            thread_id,
            text: String::new(),
            fragments: 0,
            cancel,
            timeout: None,
            started_at: None,
        }
    }

    /// Cancel the session if it has not finished within `timeout`
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Measure the timeout from `started_at` instead of from `attach`
    ///
    /// Lets a caller that already waited for the reply to start hand over the
    /// remaining budget.
    pub fn timed_from(mut self, started_at: Instant) -> Self {
        self.started_at = Some(started_at);
        self
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn thread_id(&self) -> Option<&str> {
        self.thread_id.as_deref()
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Consume `stream` to a terminal state, reporting to `observer`
    pub async fn attach<O>(mut self, mut stream: FragmentStream, observer: &mut O) -> StreamOutcome
    where
        O: StreamObserver + ?Sized,
    {
        let cancel = self.cancel.clone();
        let started_at = self.started_at.unwrap_or_else(Instant::now);
        let deadline = self.timeout.map(|t| started_at + t);

        loop {
            if cancel.is_cancelled() {
                return self.finish_cancelled();
            }

            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return self.finish_cancelled(),
                _ = wait_until(deadline) => {
                    cancel.cancel();
                    let timeout = self.timeout.unwrap_or_default();
                    warn!(thread_id = ?self.thread_id, ?timeout, "Reply timed out, cancelling session");
                    self.text.clear();
                    return StreamOutcome::TimedOut(timeout);
                }
                item = stream.next() => item,
            };

            match next {
                Some(Ok(TransportEvent::Fragment(delta))) => {
                    if delta.is_empty() {
                        continue;
                    }
                    self.text.push_str(&delta);
                    self.fragments += 1;
                    observer.on_fragment(&self.text);
                }
                Some(Ok(TransportEvent::Complete(full_text))) => {
                    if full_text != self.text {
                        warn!(
                            thread_id = ?self.thread_id,
                            accumulated = self.text.len(),
                            reported = full_text.len(),
                            "Completion text differs from accumulated fragments, keeping accumulated"
                        );
                    }
                    debug!(thread_id = ?self.thread_id, fragments = self.fragments, "Reply complete");
                    observer.on_complete(&self.text);
                    return StreamOutcome::Completed(std::mem::take(&mut self.text));
                }
                Some(Err(error)) => {
                    debug!(
                        thread_id = ?self.thread_id,
                        fragments = self.fragments,
                        error = %error,
                        "Reply stream failed"
                    );
                    self.text.clear();
                    observer.on_error(&error);
                    return StreamOutcome::Failed(error);
                }
                None => {
                    let error = GatewayError::stream_broken("reply ended without a completion marker");
                    self.text.clear();
                    observer.on_error(&error);
                    return StreamOutcome::Failed(error);
                }
            }
        }
    }

    fn finish_cancelled(&mut self) -> StreamOutcome {
        debug!(thread_id = ?self.thread_id, fragments = self.fragments, "Reply cancelled");
        self.text.clear();
        StreamOutcome::Cancelled
    }
}

/// Resolves at `deadline`, or never when there is none
pub(crate) async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
