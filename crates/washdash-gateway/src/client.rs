//! reqwest implementation of [`ChatGateway`]

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{Stream, StreamExt};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use washdash_config::{resolve_api_token, GatewayConfig};
use washdash_core::{
    ChatGateway, FragmentStream, GatewayError, GatewayResult, Message, Thread, TransportAdapter,
};

use crate::sse::{SseDecoder, SseEvent};

/// Media type of an incremental reply
const EVENT_STREAM: &str = "text/event-stream";

/// Listing responses come either bare or wrapped in `{"data": [...]}`
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ListEnvelope<T> {
    Bare(Vec<T>),
    Wrapped { data: Vec<T> },
}

impl<T> ListEnvelope<T> {
    fn into_items(self) -> Vec<T> {
        match self {
            ListEnvelope::Bare(items) | ListEnvelope::Wrapped { data: items } => items,
        }
    }
}

#[derive(Debug, Serialize)]
struct CreateThreadRequest<'a> {
    title: &'a str,
}

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    content: &'a str,
    stream: bool,
}

/// Non-streaming reply body
#[derive(Debug, Deserialize)]
struct ReplyBody {
    content: String,
}

/// HTTP client for the assistant gateway
#[derive(Debug, Clone)]
pub struct HttpChatGateway {
    client: reqwest::Client,
    base_url: String,
    api_token: Option<String>,
    timeout: Duration,
    prefer_streaming: bool,
}

impl HttpChatGateway {
    /// Client for `base_url` with default timeout and no credential
    pub fn new(base_url: impl Into<String>) -> GatewayResult<Self> {
        Self::from_config(&GatewayConfig {
            base_url: base_url.into(),
            ..GatewayConfig::default()
        })
    }

    /// Client from configuration, resolving the bearer token from env or config
    pub fn from_config(config: &GatewayConfig) -> GatewayResult<Self> {
        let timeout = config.request_timeout();
        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .build()
            .map_err(|e| GatewayError::unreachable(format!("could not build HTTP client: {}", e)))?;

        let api_token = match resolve_api_token(config) {
            Some((token, source)) => {
                debug!(source = %source, "Using gateway bearer token");
                Some(token)
            }
            None => None,
        };

        Ok(Self {
            client,
            base_url: config.normalized_base_url().to_string(),
            api_token,
            timeout,
            prefer_streaming: config.prefer_streaming,
        })
    }

    pub fn with_api_token(mut self, token: impl Into<String>) -> Self {
        self.api_token = Some(token.into());
        self
    }

    /// Timeout for every call except the body of a streamed reply
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_streaming(mut self, prefer_streaming: bool) -> Self {
        self.prefer_streaming = prefer_streaming;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn threads_url(&self) -> String {
        format!("{}/threads", self.base_url)
    }

    fn thread_url(&self, thread_id: &str) -> String {
        format!("{}/threads/{}", self.base_url, urlencoding::encode(thread_id))
    }

    fn messages_url(&self, thread_id: &str) -> String {
        format!("{}/messages", self.thread_url(thread_id))
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Send a bounded request and reject non-2xx responses
    async fn execute(&self, request: RequestBuilder) -> GatewayResult<Response> {
        let response = self
            .authorized(request)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| request_error(e, self.timeout))?;
        ensure_success(response).await
    }

    async fn read_json<T: DeserializeOwned>(&self, response: Response) -> GatewayResult<T> {
        let body = response
            .bytes()
            .await
            .map_err(|e| request_error(e, self.timeout))?;
        serde_json::from_slice(&body).map_err(|e| GatewayError::malformed(e.to_string()))
    }
}

#[async_trait]
impl ChatGateway for HttpChatGateway {
    async fn list_threads(&self) -> GatewayResult<Vec<Thread>> {
        debug!(url = %self.threads_url(), "Listing threads");
        let response = self.execute(self.client.get(self.threads_url())).await?;
        let threads = self
            .read_json::<ListEnvelope<Thread>>(response)
            .await?
            .into_items();

        let total = threads.len();
        let threads: Vec<Thread> = threads.into_iter().filter(|t| !t.is_draft()).collect();
        if threads.len() != total {
            warn!(
                skipped = total - threads.len(),
                "Gateway listed threads without an id"
            );
        }
        Ok(threads)
    }

    async fn get_thread(&self, id: &str) -> GatewayResult<Thread> {
        let response = self.execute(self.client.get(self.thread_url(id))).await?;
        let thread: Thread = self.read_json(response).await?;
        require_id(thread)
    }

    async fn get_messages(&self, thread_id: &str) -> GatewayResult<Vec<Message>> {
        let response = self
            .execute(self.client.get(self.messages_url(thread_id)))
            .await?;
        let messages = self
            .read_json::<ListEnvelope<Message>>(response)
            .await?
            .into_items();
        debug!(thread_id, count = messages.len(), "Fetched messages");
        Ok(messages)
    }

    async fn create_thread(&self, title_seed: &str) -> GatewayResult<Thread> {
        let request = self
            .client
            .post(self.threads_url())
            .json(&CreateThreadRequest { title: title_seed });
        let response = self.execute(request).await?;
        let thread: Thread = self.read_json(response).await?;
        require_id(thread)
    }

    async fn send_message(&self, thread_id: &str, content: &str) -> GatewayResult<FragmentStream> {
        let mut request = self.client.post(self.messages_url(thread_id)).json(&SendMessageRequest {
            content,
            stream: self.prefer_streaming,
        });
        if self.prefer_streaming {
            request = request.header(ACCEPT, EVENT_STREAM);
        }

        // Connect timeout only; the reply deadline belongs to the controller
        let response = self
            .authorized(request)
            .send()
            .await
            .map_err(|e| request_error(e, self.timeout))?;
        let response = ensure_success(response).await?;

        if is_event_stream(&response) {
            debug!(thread_id, "Reply is an event stream");
            Ok(TransportAdapter::from_chunks(event_stream_chunks(response)))
        } else {
            let reply: ReplyBody = self.read_json(response).await?;
            debug!(thread_id, chars = reply.content.chars().count(), "Reply arrived whole");
            Ok(TransportAdapter::from_message(reply.content))
        }
    }

    async fn delete_thread(&self, id: &str) -> GatewayResult<()> {
        self.execute(self.client.delete(self.thread_url(id))).await?;
        debug!(thread_id = id, "Deleted thread");
        Ok(())
    }

    fn gateway_name(&self) -> &str {
        "http"
    }
}

fn require_id(thread: Thread) -> GatewayResult<Thread> {
    if thread.is_draft() {
        Err(GatewayError::malformed("thread has no id"))
    } else {
        Ok(thread)
    }
}

fn request_error(error: reqwest::Error, timeout: Duration) -> GatewayError {
    if error.is_timeout() {
        GatewayError::Timeout(timeout)
    } else if error.is_decode() {
        GatewayError::malformed(error.to_string())
    } else {
        GatewayError::unreachable(error.to_string())
    }
}

async fn ensure_success(response: Response) -> GatewayResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    warn!(status = status.as_u16(), "Gateway request failed");
    Err(GatewayError::status(status.as_u16(), body))
}

fn is_event_stream(response: &Response) -> bool {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with(EVENT_STREAM))
}

/// Text deltas of an SSE body, ending at `[DONE]`
///
/// A body that closes before `[DONE]` ends with `StreamBroken`.
fn event_stream_chunks(response: Response) -> impl Stream<Item = GatewayResult<String>> + Send + 'static {
    async_stream::stream! {
        let mut body = response.bytes_stream();
        let mut decoder = SseDecoder::new();
        let mut body_ended = false;

        while !body_ended {
            let decoded = match body.next().await {
                Some(Ok(chunk)) => decoder.push(&chunk),
                Some(Err(e)) => Err(GatewayError::stream_broken(e.to_string())),
                None => {
                    body_ended = true;
                    decoder.finish()
                }
            };

            let events = match decoded {
                Ok(events) => events,
                Err(e) => {
                    yield Err(e);
                    return;
                }
            };

            for event in events {
                match event {
                    SseEvent::Delta(text) => yield Ok(text),
                    SseEvent::Done => return,
                    SseEvent::Error(message) => {
                        yield Err(GatewayError::stream_broken(format!("gateway aborted reply: {}", message)));
                        return;
                    }
                }
            }
        }

        yield Err(GatewayError::stream_broken("event stream closed before [DONE]"));
    }
}
