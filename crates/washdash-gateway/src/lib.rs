//! HTTP gateway for the washdash assistant chat
//!
//! [`HttpChatGateway`] implements [`washdash_core::ChatGateway`] over the
//! dashboard's REST API. Replies are requested as server-sent events and
//! decoded by [`sse::SseDecoder`]; a gateway that answers with a plain JSON
//! message is handled too.

pub mod client;
pub mod sse;

pub use client::HttpChatGateway;
pub use sse::{SseDecoder, SseEvent};
