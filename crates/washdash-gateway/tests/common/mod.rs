//! Shared fixtures for gateway integration tests

#![allow(dead_code)]

use futures::StreamExt;
use serde_json::{json, Value};
use washdash_core::{FragmentStream, GatewayError, TransportEvent};

pub const CREATED_AT: &str = "2026-03-01T08:00:00Z";

pub fn thread_json(id: &str, title: &str) -> Value {
    json!({
        "id": id,
        "title": title,
        "created_at": CREATED_AT,
        "updated_at": CREATED_AT,
    })
}

pub fn message_json(id: &str, role: &str, content: &str) -> Value {
    json!({
        "id": id,
        "role": role,
        "content": content,
        "timestamp": CREATED_AT,
    })
}

/// SSE body streaming `deltas` and ending with `[DONE]`
pub fn sse_body(deltas: &[&str]) -> String {
    let mut body = sse_body_without_done(deltas);
    body.push_str("data: [DONE]\n\n");
    body
}

/// SSE body that closes without a completion marker
pub fn sse_body_without_done(deltas: &[&str]) -> String {
    let mut body = String::from(": stream open\n\n");
    for delta in deltas {
        body.push_str(&format!("data: {}\n\n", json!({ "content": delta })));
    }
    body
}

/// Fragments received before the stream ended, and how it ended
pub async fn collect_fragments(mut stream: FragmentStream) -> (Vec<String>, Result<String, GatewayError>) {
    let mut fragments = Vec::new();
    while let Some(event) = stream.next().await {
        match event {
            Ok(TransportEvent::Fragment(delta)) => fragments.push(delta),
            Ok(TransportEvent::Complete(text)) => return (fragments, Ok(text)),
            Err(e) => return (fragments, Err(e)),
        }
    }
    (
        fragments,
        Err(GatewayError::stream_broken("ended without completion")),
    )
}
