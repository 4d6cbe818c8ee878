//! Backend chat gateway contract
//!
//! The gateway owns thread and message persistence. The controller consumes
//! it only through this trait, so the HTTP client and the scripted test
//! gateway are interchangeable.

use async_trait::async_trait;

use crate::error::GatewayResult;
use crate::transport::FragmentStream;
use crate::types::{Message, Thread};

/// Thread/message persistence and reply generation
///
/// Implementations must never be handed a draft thread: every `thread_id`
/// passed in was previously returned by [`ChatGateway::create_thread`] or
/// [`ChatGateway::list_threads`].
#[async_trait]
pub trait ChatGateway: Send + Sync {
    /// All threads visible to the current credential, most recent first
    async fn list_threads(&self) -> GatewayResult<Vec<Thread>>;

    async fn get_thread(&self, id: &str) -> GatewayResult<Thread>;

    /// Messages of a thread in conversation order
    async fn get_messages(&self, thread_id: &str) -> GatewayResult<Vec<Message>>;

    /// Create a thread titled `title_seed`; the returned thread carries its id
    async fn create_thread(&self, title_seed: &str) -> GatewayResult<Thread>;

    /// Send a user message and return the assistant reply as fragments
    ///
    /// An `Err` here means the message was not accepted. Errors after the
    /// stream has started are delivered in-stream.
    async fn send_message(&self, thread_id: &str, content: &str) -> GatewayResult<FragmentStream>;

    async fn delete_thread(&self, id: &str) -> GatewayResult<()>;

    /// Name used in log output
    fn gateway_name(&self) -> &str {
        "gateway"
    }
}
