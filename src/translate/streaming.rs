//! Turn an `OpenAI` SSE stream into native chat responses.
//!
//! [`StreamAccumulator`] consumes `ChatCompletionChunk`s one at a time. Text and
//! reasoning increments come straight back out as partial responses; tool-call
//! deltas are collected per index and only surface in the terminal response,
//! once their argument fragments have been joined and parsed.
//!
//! [`transcode_stream`] is the read loop around it: SSE framing, the `[DONE]`
//! sentinel, and delivery into a [`ResponseSink`].

use std::collections::BTreeMap;

use bytes::Bytes;
use eventsource_stream::Eventsource;
use futures::stream::{self, Stream, StreamExt};

use super::chat_types::{ChatResponse, Message, Role, ToolCall};
use super::openai_types::{ChatCompletionChunk, ChunkToolCall};
use super::response::parse_arguments;
use crate::error::{BridgeError, Result};
use crate::sink::ResponseSink;

/// Data payload that ends an `OpenAI` event stream.
pub const DONE_SENTINEL: &str = "[DONE]";

/// Appended after the body so an unterminated final event is dispatched.
const EVENT_TERMINATOR: &[u8] = b"\n\n";

/// A tool call still being streamed; arguments stay raw until the end.
#[derive(Debug, Clone, Default)]
struct PendingToolCall {
    id: String,
    name: String,
    arguments: String,
}

/// Per-call state for one streamed completion.
///
/// Usage:
///   let mut acc = StreamAccumulator::new("llama-remote");
///   for chunk in chunks {
///       for partial in acc.process_chunk(&chunk) {
///           // deliver partial
///       }
///   }
///   let terminal = acc.finish();
#[derive(Debug)]
pub struct StreamAccumulator {
    model: String,
    content: String,
    thinking: String,
    tool_calls: BTreeMap<u64, PendingToolCall>,
    finish_reason: Option<String>,
    prompt_tokens: u64,
    completion_tokens: u64,
}

impl StreamAccumulator {
    pub fn new(model: &str) -> Self {
        Self {
            model: model.to_string(),
            content: String::new(),
            thinking: String::new(),
            tool_calls: BTreeMap::new(),
            finish_reason: None,
            prompt_tokens: 0,
            completion_tokens: 0,
        }
    }

    /// Fold one chunk into the accumulator, returning the partial responses
    /// it produces (at most one for text, one for reasoning).
    pub fn process_chunk(&mut self, chunk: &ChatCompletionChunk) -> Vec<ChatResponse> {
        if let Some(ref usage) = chunk.usage {
            self.prompt_tokens = usage.prompt_tokens;
            self.completion_tokens = usage.completion_tokens;
        }

        let Some(choice) = chunk.choices.first() else {
            return Vec::new();
        };

        let mut partials = Vec::new();

        if let Some(content) = choice.delta.content.as_deref().filter(|s| !s.is_empty()) {
            self.content.push_str(content);
            partials.push(ChatResponse::partial(&self.model, Message::assistant(content)));
        }

        if let Some(reasoning) = choice.delta.reasoning_text() {
            self.thinking.push_str(reasoning);
            let message = Message {
                thinking: Some(reasoning.to_string()),
                ..Message::assistant("")
            };
            partials.push(ChatResponse::partial(&self.model, message));
        }

        for tc in choice.delta.tool_calls.iter().flatten() {
            self.absorb_tool_delta(tc);
        }

        if let Some(reason) = choice.finish_reason.as_deref().filter(|r| !r.is_empty()) {
            self.finish_reason = Some(reason.to_string());
        }

        partials
    }

    fn absorb_tool_delta(&mut self, tc: &ChunkToolCall) {
        let name = tc
            .function
            .as_ref()
            .and_then(|f| f.name.as_deref())
            .filter(|n| !n.is_empty());
        let fragment = tc
            .function
            .as_ref()
            .and_then(|f| f.arguments.as_deref())
            .unwrap_or_default();
        let id = tc.id.as_deref().filter(|id| !id.is_empty());

        let slot = self.tool_calls.entry(tc.index).or_default();
        if let Some(id) = id {
            slot.id = id.to_string();
        }
        if let Some(name) = name {
            slot.name = name.to_string();
        }
        slot.arguments.push_str(fragment);
    }

    /// Build the terminal response from everything accumulated so far.
    pub fn finish(self) -> ChatResponse {
        let tool_calls = self
            .tool_calls
            .into_values()
            .filter_map(|pending| match parse_arguments(&pending.arguments) {
                Ok(arguments) => Some(ToolCall::new(pending.id, pending.name, arguments)),
                Err(e) => {
                    tracing::warn!(
                        tool = %pending.name,
                        error = %e,
                        "dropping streamed tool call with unparseable arguments"
                    );
                    None
                }
            })
            .collect();

        let message = Message {
            role: Role::Assistant,
            content: self.content,
            thinking: Some(self.thinking).filter(|t| !t.is_empty()),
            tool_calls,
            ..Message::default()
        };

        ChatResponse {
            done: true,
            done_reason: Some(self.finish_reason.unwrap_or_else(|| "stop".to_string())),
            prompt_eval_count: self.prompt_tokens,
            eval_count: self.completion_tokens,
            ..ChatResponse::partial(&self.model, message)
        }
    }
}

/// Read an SSE byte stream to the end, delivering partial responses as they
/// arrive and one terminal response when the stream ends.
///
/// The stream ends at the `[DONE]` sentinel or, for remotes that never send
/// one, when the body closes. A last event left without its blank-line
/// terminator at that point is still processed.
///
/// # Errors
/// Returns `BridgeError::StreamRead` if the body fails mid-stream, or the
/// sink's own error if it refuses a delivery. Responses already delivered
/// are not retracted.
pub async fn transcode_stream<S, B, E, K>(byte_stream: S, model: &str, sink: &mut K) -> Result<()>
where
    S: Stream<Item = std::result::Result<B, E>>,
    B: Into<Bytes>,
    E: std::fmt::Display,
    K: ResponseSink + ?Sized,
{
    let mut accumulator = StreamAccumulator::new(model);
    let events = byte_stream
        .map(|frame| frame.map(Into::<Bytes>::into))
        .chain(stream::once(async { Ok(Bytes::from_static(EVENT_TERMINATOR)) }))
        .eventsource();
    tokio::pin!(events);

    while let Some(event) = events.next().await {
        let event = event.map_err(|e| BridgeError::stream_read(e.to_string()))?;
        let data = event.data.trim();

        if data.is_empty() {
            continue;
        }

        if data == DONE_SENTINEL {
            return sink.deliver(accumulator.finish()).await;
        }

        let chunk: ChatCompletionChunk = match serde_json::from_str(data) {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(error = %e, data = %data, "skipping unparseable chunk");
                continue;
            }
        };

        for partial in accumulator.process_chunk(&chunk) {
            sink.deliver(partial).await?;
        }
    }

    tracing::debug!("stream closed without {DONE_SENTINEL} sentinel");
    sink.deliver(accumulator.finish()).await
}
