//! Turns a canonical `StreamEvent` stream into the client-facing SSE wire format, the
//! way the teacher's `handler.rs` builds its `Sse<...>` responses — generalized to emit
//! every Anthropic event a single canonical event maps to, not just the first.

use std::pin::Pin;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::response::sse::{Event, KeepAlive, Sse};
use futures_util::{Stream, StreamExt};
use gateway_core::GatewayError;
use gateway_llm::convert::anthropic::CanonicalStreamState;
use gateway_llm::convert::openai::canonical_event_to_openai_chunk;
use gateway_llm::protocol::anthropic::AnthropicStreamEvent;
use gateway_llm::types::StreamEvent;

fn now_unix() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or_default()
}

pub fn openai_stream_response(
    stream: Pin<Box<dyn Stream<Item = Result<StreamEvent, GatewayError>> + Send>>,
    response_id: String,
    model: String,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let created = now_unix();

    let event_stream = stream.map(move |result| match result {
        Ok(event) => {
            let Some(chunk) = canonical_event_to_openai_chunk(&event, &response_id, &model, created) else {
                return Ok(Event::default().comment(""));
            };
            if matches!(event, StreamEvent::Done) {
                Ok(Event::default().data("[DONE]"))
            } else {
                let data = serde_json::to_string(&chunk).unwrap_or_default();
                Ok(Event::default().data(data))
            }
        }
        Err(err) => Ok(Event::default().data(streaming_error_json(&err).to_string())),
    });

    Sse::new(event_stream).keep_alive(KeepAlive::default())
}

pub fn anthropic_stream_response(
    stream: Pin<Box<dyn Stream<Item = Result<StreamEvent, GatewayError>> + Send>>,
    response_id: String,
    model: String,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let mut state = CanonicalStreamState::new();

    let event_stream = stream
        .map(move |result| match result {
            Ok(event) => {
                let anthropic_events = state.handle(&event, &response_id, &model);
                anthropic_events
                    .into_iter()
                    .map(|e| {
                        let event_type = anthropic_event_type(&e);
                        let data = serde_json::to_string(&e).unwrap_or_default();
                        Ok(Event::default().event(event_type).data(data))
                    })
                    .collect::<Vec<Result<Event, axum::Error>>>()
            }
            Err(err) => {
                let data = serde_json::json!({
                    "type": "error",
                    "error": { "type": "streaming_error", "message": err.to_string() }
                });
                vec![Ok(Event::default().event("error").data(data.to_string()))]
            }
        })
        .flat_map(futures_util::stream::iter);

    Sse::new(event_stream).keep_alive(KeepAlive::default())
}

fn streaming_error_json(err: &GatewayError) -> serde_json::Value {
    serde_json::json!({
        "error": { "message": err.to_string(), "type": "streaming_error" }
    })
}

const fn anthropic_event_type(event: &AnthropicStreamEvent) -> &'static str {
    match event {
        AnthropicStreamEvent::MessageStart { .. } => "message_start",
        AnthropicStreamEvent::ContentBlockStart { .. } => "content_block_start",
        AnthropicStreamEvent::ContentBlockDelta { .. } => "content_block_delta",
        AnthropicStreamEvent::ContentBlockStop { .. } => "content_block_stop",
        AnthropicStreamEvent::MessageDelta { .. } => "message_delta",
        AnthropicStreamEvent::MessageStop => "message_stop",
        AnthropicStreamEvent::Ping | AnthropicStreamEvent::Other => "ping",
    }
}
