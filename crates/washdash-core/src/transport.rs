//! Transport adapter: one reply as an ordered fragment sequence
//!
//! A reply is a lazy, finite, non-restartable stream of
//! [`TransportEvent::Fragment`]s terminated by exactly one
//! [`TransportEvent::Complete`] carrying the concatenated text. If the
//! underlying transport breaks, the stream ends with an `Err` instead and no
//! completion marker is produced.

use futures::stream::{BoxStream, Stream, StreamExt};

use crate::error::{GatewayError, GatewayResult};

/// Item of a reply stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Next chunk of assistant text, never empty
    Fragment(String),
    /// End of reply with the full text
    Complete(String),
}

/// Reply stream handed out by [`crate::ChatGateway::send_message`]
pub type FragmentStream = BoxStream<'static, GatewayResult<TransportEvent>>;

/// Builds [`FragmentStream`]s from the two reply shapes a gateway produces
pub struct TransportAdapter;

impl TransportAdapter {
    /// Wrap an incremental reply
    ///
    /// `chunks` yields text deltas and ends when the reply is done. Empty
    /// deltas are skipped. The first error ends the stream without a
    /// completion marker.
    pub fn from_chunks<S>(chunks: S) -> FragmentStream
    where
        S: Stream<Item = GatewayResult<String>> + Send + 'static,
    {
        Box::pin(async_stream::stream! {
            let mut chunks = Box::pin(chunks);
            let mut full_text = String::new();

            while let Some(chunk) = chunks.next().await {
                match chunk {
                    Ok(delta) => {
                        if delta.is_empty() {
                            continue;
                        }
                        full_text.push_str(&delta);
                        yield Ok(TransportEvent::Fragment(delta));
                    }
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                }
            }

            yield Ok(TransportEvent::Complete(full_text));
        })
    }

    /// Wrap a reply that arrived as one complete message
    pub fn from_message(content: String) -> FragmentStream {
        let chunks = futures::stream::once(async move { Ok(content) });
        Self::from_chunks(chunks)
    }

    /// Stream that fails immediately, for callers that must return a stream
    pub fn failed(error: GatewayError) -> FragmentStream {
        Box::pin(futures::stream::once(async move { Err(error) }))
    }
}

/// Drain a reply and return its full text
///
/// For callers that do not display partial replies.
pub async fn collect_text(mut stream: FragmentStream) -> GatewayResult<String> {
    let mut text = String::new();
    while let Some(event) = stream.next().await {
        match event? {
            TransportEvent::Fragment(delta) => text.push_str(&delta),
            TransportEvent::Complete(_) => return Ok(text),
        }
    }
    Err(GatewayError::stream_broken(
        "reply ended without a completion marker",
    ))
}
