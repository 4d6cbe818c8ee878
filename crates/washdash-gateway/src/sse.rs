//! Server-sent-events decoder for incremental replies
//!
//! The gateway streams a reply as `data:` lines:
//!
//! ```text
//! data: {"content": "Chlorine "}
//! data: {"content": "stock is 40kg."}
//! data: [DONE]
//! ```
//!
//! `event: error` followed by `data: {"error": "..."}` aborts the reply.
//! Comment lines (`: keep-alive`) and blank lines are ignored. Network chunks
//! may split a line anywhere, including inside a multi-byte character, so
//! bytes are buffered until a full line is available.

use serde::Deserialize;
use washdash_core::{GatewayError, GatewayResult};

/// Marker that ends a reply
pub const DONE_MARKER: &str = "[DONE]";

/// Decoded SSE item relevant to a reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    /// Next piece of assistant text, never empty
    Delta(String),
    /// Reply finished
    Done,
    /// Gateway aborted the reply
    Error(String),
}

#[derive(Debug, Deserialize)]
struct DataPayload {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    delta: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Incremental line decoder
///
/// Feed raw body chunks to [`SseDecoder::push`] and call
/// [`SseDecoder::finish`] once the body ends. Nothing is emitted after
/// [`SseEvent::Done`] or [`SseEvent::Error`].
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    event: Option<String>,
    finished: bool,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a terminal event has been decoded
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Decode every complete line in `chunk` plus previously buffered bytes
    pub fn push(&mut self, chunk: &[u8]) -> GatewayResult<Vec<SseEvent>> {
        if self.finished {
            return Ok(Vec::new());
        }
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(line_end) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=line_end).collect();
            if let Some(event) = self.decode_line(&line)? {
                events.push(event);
            }
            if self.finished {
                self.buffer.clear();
                break;
            }
        }
        Ok(events)
    }

    /// Decode a trailing line that was not newline-terminated
    pub fn finish(&mut self) -> GatewayResult<Vec<SseEvent>> {
        if self.finished || self.buffer.is_empty() {
            return Ok(Vec::new());
        }
        let line = std::mem::take(&mut self.buffer);
        Ok(self.decode_line(&line)?.into_iter().collect())
    }

    fn decode_line(&mut self, raw: &[u8]) -> GatewayResult<Option<SseEvent>> {
        let line = std::str::from_utf8(raw)
            .map_err(|e| GatewayError::malformed(format!("invalid UTF-8 in event stream: {}", e)))?;
        let line = line.trim_end_matches(&['\r', '\n'][..]);

        if line.is_empty() {
            // Blank line ends the current event block
            self.event = None;
            return Ok(None);
        }
        if line.starts_with(':') {
            return Ok(None);
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "event" => {
                self.event = Some(value.to_string());
                Ok(None)
            }
            "data" => self.decode_data(value),
            _ => Ok(None),
        }
    }

    fn decode_data(&mut self, data: &str) -> GatewayResult<Option<SseEvent>> {
        if self.event.as_deref() == Some("error") {
            self.finished = true;
            let message = serde_json::from_str::<DataPayload>(data)
                .ok()
                .and_then(|payload| payload.error)
                .unwrap_or_else(|| data.to_string());
            return Ok(Some(SseEvent::Error(message)));
        }

        if data.trim() == DONE_MARKER {
            self.finished = true;
            return Ok(Some(SseEvent::Done));
        }

        let payload: DataPayload = serde_json::from_str(data)
            .map_err(|e| GatewayError::malformed(format!("undecodable stream event: {}", e)))?;

        if let Some(error) = payload.error {
            self.finished = true;
            return Ok(Some(SseEvent::Error(error)));
        }

        match payload.content.or(payload.delta) {
            Some(text) if !text.is_empty() => Ok(Some(SseEvent::Delta(text))),
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(input: &str) -> Vec<SseEvent> {
        let mut decoder = SseDecoder::new();
        let mut events = decoder.push(input.as_bytes()).unwrap();
        events.extend(decoder.finish().unwrap());
        events
    }

    #[test]
    fn test_deltas_and_done() {
        let input = "data: {\"content\": \"Chlorine \"}\n\ndata: {\"content\": \"stock\"}\n\ndata: [DONE]\n\n";
        assert_eq!(
            decode_all(input),
            vec![
                SseEvent::Delta("Chlorine ".into()),
                SseEvent::Delta("stock".into()),
                SseEvent::Done,
            ]
        );
    }

    #[test]
    fn test_delta_key_is_accepted() {
        assert_eq!(
            decode_all("data: {\"delta\": \"hi\"}\n"),
            vec![SseEvent::Delta("hi".into())]
        );
    }

    #[test]
    fn test_comments_blank_lines_and_unknown_fields_ignored() {
        let input = ": keep-alive\n\nid: 7\nretry: 1000\ndata: {\"content\": \"x\"}\r\n\r\n";
        assert_eq!(decode_all(input), vec![SseEvent::Delta("x".into())]);
    }

    #[test]
    fn test_empty_content_is_skipped() {
        assert!(decode_all("data: {\"content\": \"\"}\n").is_empty());
    }

    #[test]
    fn test_error_event() {
        let input = "data: {\"content\": \"part\"}\n\nevent: error\ndata: {\"error\": \"model overloaded\"}\n\n";
        assert_eq!(
            decode_all(input),
            vec![
                SseEvent::Delta("part".into()),
                SseEvent::Error("model overloaded".into()),
            ]
        );
    }

    #[test]
    fn test_error_event_with_plain_text_data() {
        assert_eq!(
            decode_all("event: error\ndata: upstream timeout\n"),
            vec![SseEvent::Error("upstream timeout".into())]
        );
    }

    #[test]
    fn test_error_field_in_data_payload() {
        assert_eq!(
            decode_all("data: {\"error\": \"quota exceeded\"}\n"),
            vec![SseEvent::Error("quota exceeded".into())]
        );
    }

    #[test]
    fn test_nothing_after_done() {
        let mut decoder = SseDecoder::new();
        let events = decoder
            .push(b"data: [DONE]\ndata: {\"content\": \"late\"}\n")
            .unwrap();
        assert_eq!(events, vec![SseEvent::Done]);
        assert!(decoder.is_finished());
        assert!(decoder.push(b"data: {\"content\": \"later\"}\n").unwrap().is_empty());
    }

    #[test]
    fn test_partial_line_waits_for_newline() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: {\"cont").unwrap().is_empty());
        assert_eq!(
            decoder.push(b"ent\": \"ok\"}\n").unwrap(),
            vec![SseEvent::Delta("ok".into())]
        );
    }

    #[test]
    fn test_split_inside_multibyte_character() {
        let line = "data: {\"content\": \"água\"}\n".as_bytes();
        let split = line.iter().position(|b| *b == 0xC3).unwrap() + 1;

        let mut decoder = SseDecoder::new();
        assert!(decoder.push(&line[..split]).unwrap().is_empty());
        assert_eq!(
            decoder.push(&line[split..]).unwrap(),
            vec![SseEvent::Delta("água".into())]
        );
    }

    #[test]
    fn test_trailing_line_without_newline() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: [DONE]").unwrap().is_empty());
        assert_eq!(decoder.finish().unwrap(), vec![SseEvent::Done]);
    }

    #[test]
    fn test_undecodable_data_is_malformed() {
        let mut decoder = SseDecoder::new();
        let result = decoder.push(b"data: {not json}\n");
        assert!(matches!(result, Err(GatewayError::Malformed(_))));
    }
}
