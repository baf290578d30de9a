//! Chat server transport: prompt submission and the inbound SSE stream.
//!
//! The server takes a form POST on `/chat` and then streams the reply on
//! `/chat-stream?session_id=…`. Each SSE `data:` payload is either an
//! OpenAI-style chunk (`choices[0].delta.content`) or the `[DONE]` sentinel.
//! `event: error` frames report upstream failures; `event: ping` frames are
//! keep-alives.

use std::fmt;
use std::pin::Pin;

use eventsource_stream::Eventsource;
use futures_util::{Stream, StreamExt};
use serde::Deserialize;

use crate::config::ChatConfig;
use crate::error::{ChatError, Result};

/// Literal payload marking the end of a reply.
pub const DONE_SENTINEL: &str = "[DONE]";

// -- wire types -------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct ChunkDelta {
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChunkChoice {
    #[serde(default)]
    pub delta: Option<ChunkDelta>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StreamChunk {
    #[serde(default)]
    pub choices: Vec<ChunkChoice>,
}

/// One inbound event, already classified for the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    /// A text fragment of the reply.
    Delta(String),
    /// The sentinel: no further deltas will arrive.
    Done,
    /// Stream-level failure. Fatal to the current message.
    Failed(String),
    /// Keep-alives, chunks without content and skipped malformed payloads.
    Ignored,
}

/// Extract `choices[0].delta.content` from a chunk payload.
///
/// # Errors
/// `ChatError::Payload` when `data` is not a chunk object.
pub fn decode_delta(data: &str) -> Result<Option<String>> {
    let chunk: StreamChunk = serde_json::from_str(data)?;
    Ok(chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta)
        .and_then(|delta| delta.content))
}

/// Classify one SSE frame.
///
/// A payload that is not valid JSON is logged and skipped; the stream goes
/// on.
pub fn parse_event(event_type: &str, data: &str) -> InboundEvent {
    match event_type {
        "error" => return InboundEvent::Failed(data.to_string()),
        "ping" => return InboundEvent::Ignored,
        _ => {}
    }
    if data.trim() == DONE_SENTINEL {
        return InboundEvent::Done;
    }
    match decode_delta(data) {
        Ok(Some(content)) => InboundEvent::Delta(content),
        Ok(None) => InboundEvent::Ignored,
        Err(e) => {
            tracing::warn!(error = %e, payload = %data, "skipping malformed stream payload");
            InboundEvent::Ignored
        }
    }
}

// -- inbound stream ---------------------------------------------------------

type EventStream = Pin<Box<dyn Stream<Item = InboundEvent> + Send>>;

/// The open inbound stream of one message.
///
/// After the sentinel or a failure has been yielded the stream closes itself
/// and yields nothing more. A transport that ends without the sentinel yields
/// one `Failed` event first.
pub struct InboundStream {
    inner: Option<EventStream>,
}

impl fmt::Debug for InboundStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InboundStream")
            .field("open", &self.is_open())
            .finish()
    }
}

impl InboundStream {
    /// Wrap an already classified event stream.
    pub fn new<S>(events: S) -> Self
    where
        S: Stream<Item = InboundEvent> + Send + 'static,
    {
        Self {
            inner: Some(Box::pin(events)),
        }
    }

    /// Parse SSE frames out of a raw byte stream.
    pub fn from_bytes<S, B, E>(bytes: S) -> Self
    where
        S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
        B: AsRef<[u8]> + Send + 'static,
        E: fmt::Display + Send + 'static,
    {
        let events = bytes.eventsource().map(|item| match item {
            Ok(event) => parse_event(&event.event, &event.data),
            Err(e) => InboundEvent::Failed(e.to_string()),
        });
        Self::new(events)
    }

    /// Next event in server-send order, `None` once closed.
    pub async fn next(&mut self) -> Option<InboundEvent> {
        let inner = self.inner.as_mut()?;
        let event = match inner.next().await {
            Some(event) => event,
            None => InboundEvent::Failed("stream ended before [DONE]".to_string()),
        };
        if matches!(event, InboundEvent::Done | InboundEvent::Failed(_)) {
            self.close();
        }
        Some(event)
    }

    pub fn close(&mut self) {
        self.inner = None;
    }

    pub fn is_open(&self) -> bool {
        self.inner.is_some()
    }
}

// -- client -----------------------------------------------------------------

/// HTTP client for the chat server.
#[derive(Debug, Clone)]
pub struct ChatClient {
    client: reqwest::Client,
    base_url: String,
}

impl ChatClient {
    pub fn new(config: &ChatConfig) -> Self {
        // Client::builder() only fails in broken TLS setups; fall back to the
        // default client rather than panicking.
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout())
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: config.base_url().to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// POST the prompt as `application/x-www-form-urlencoded`.
    pub async fn submit(&self, prompt: &str, session_id: &str) -> Result<()> {
        let url = format!("{}/chat", self.base_url);
        let resp = self
            .client
            .post(&url)
            .form(&[("prompt", prompt), ("session_id", session_id)])
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(ChatError::Http {
                status: resp.status().as_u16(),
                url,
            });
        }
        // Body is an acknowledgement only.
        let _ = resp.text().await?;
        tracing::debug!(%session_id, "prompt submitted");
        Ok(())
    }

    /// Open the reply stream for `session_id`.
    pub async fn open_stream(&self, session_id: &str) -> Result<InboundStream> {
        let url = format!("{}/chat-stream", self.base_url);
        let resp = self
            .client
            .get(&url)
            .query(&[("session_id", session_id)])
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(ChatError::Http {
                status: resp.status().as_u16(),
                url,
            });
        }
        tracing::debug!(%session_id, "reply stream opened");
        Ok(InboundStream::from_bytes(resp.bytes_stream()))
    }
}
