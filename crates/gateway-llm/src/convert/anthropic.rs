//! Conversion between internal types and the Anthropic Messages API wire format (§4.4/§4.5).

use std::collections::{HashMap, HashSet};

use crate::protocol::anthropic::{
    AnthropicContent, AnthropicContentBlock, AnthropicImageSource, AnthropicMessage, AnthropicMessageDelta,
    AnthropicRequest, AnthropicResponse, AnthropicResponseBlock, AnthropicServerToolUse, AnthropicStreamContentBlock,
    AnthropicStreamDelta, AnthropicStreamEvent, AnthropicStreamMessage, AnthropicTool, AnthropicToolChoice,
    AnthropicUsage, AnthropicWebSearchResultItem,
};
use crate::types::{
    Annotation, ChoiceMessage, CompletionParams, CompletionRequest, CompletionResponse, Content, ContentPart,
    FinishReason, FunctionCall, FunctionDefinition, Message, Role, StreamDelta, StreamEvent, StreamFunctionCall,
    StreamToolCall, ToolCall, ToolChoice, ToolChoiceFunction, ToolChoiceFunctionName, ToolChoiceMode, ToolDefinition,
    Usage, build_tool_call,
};

const DEFAULT_MAX_TOKENS: u32 = 4096;

impl From<&CompletionRequest> for AnthropicRequest {
    fn from(req: &CompletionRequest) -> Self {
        let system = req
            .messages
            .iter()
            .find(|m| m.role == Role::System)
            .map(|m| m.content.as_text());

        let messages = req
            .messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(Into::into)
            .collect();

        Self {
            model: req.model.clone(),
            max_tokens: req.params.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            system,
            messages,
            temperature: req.params.temperature,
            top_p: req.params.top_p,
            stop_sequences: req.params.stop.clone(),
            stream: req.stream.then_some(true),
            tools: req.tools.as_ref().map(|tools| {
                tools
                    .iter()
                    .map(|t| AnthropicTool {
                        name: t.function.name.clone(),
                        description: t.function.description.clone(),
                        input_schema: t.function.parameters.clone().unwrap_or_else(|| serde_json::json!({})),
                    })
                    .collect()
            }),
            tool_choice: req.tool_choice.as_ref().map(|choice| match choice {
                ToolChoice::Mode(ToolChoiceMode::None) => {
                    AnthropicToolChoice { choice_type: "auto".to_owned(), name: None }
                }
                ToolChoice::Mode(ToolChoiceMode::Auto) => {
                    AnthropicToolChoice { choice_type: "auto".to_owned(), name: None }
                }
                ToolChoice::Mode(ToolChoiceMode::Required) => {
                    AnthropicToolChoice { choice_type: "any".to_owned(), name: None }
                }
                ToolChoice::Function(func) => {
                    AnthropicToolChoice { choice_type: "tool".to_owned(), name: Some(func.function.name.clone()) }
                }
            }),
        }
    }
}

impl From<&Message> for AnthropicMessage {
    fn from(msg: &Message) -> Self {
        if let (Some(tool_call_id), content) = (&msg.tool_call_id, msg.content.as_text()) {
            return Self {
                role: "user".to_owned(),
                content: AnthropicContent::Blocks(vec![AnthropicContentBlock::ToolResult {
                    tool_use_id: tool_call_id.clone(),
                    content: Some(content),
                    is_error: None,
                }]),
            };
        }

        if let Some(tool_calls) = &msg.tool_calls {
            let mut blocks: Vec<AnthropicContentBlock> = Vec::new();
            if !msg.content.as_text().is_empty() {
                blocks.push(AnthropicContentBlock::Text { text: msg.content.as_text() });
            }
            for tc in tool_calls {
                blocks.push(AnthropicContentBlock::ToolUse {
                    id: tc.id.clone(),
                    name: tc.function.name.clone(),
                    input: serde_json::from_str(&tc.function.arguments).unwrap_or(serde_json::Value::Null),
                });
            }
            return Self { role: "assistant".to_owned(), content: AnthropicContent::Blocks(blocks) };
        }

        let role = if msg.role == Role::Assistant { "assistant" } else { "user" };
        let content = match &msg.content {
            Content::Text(text) => AnthropicContent::Text(text.clone()),
            Content::Parts(parts) => AnthropicContent::Blocks(parts.iter().map(content_part_to_block).collect()),
        };

        Self { role: role.to_owned(), content }
    }
}

fn content_part_to_block(part: &ContentPart) -> AnthropicContentBlock {
    match part {
        ContentPart::Text { text } => AnthropicContentBlock::Text { text: text.clone() },
        ContentPart::Image { url, .. } => {
            if let Some((media_type, data)) = parse_data_uri(url) {
                AnthropicContentBlock::Image {
                    source: AnthropicImageSource { source_type: "base64".to_owned(), media_type: Some(media_type), data },
                }
            } else {
                AnthropicContentBlock::Image {
                    source: AnthropicImageSource { source_type: "url".to_owned(), media_type: None, data: url.clone() },
                }
            }
        }
    }
}

fn parse_data_uri(url: &str) -> Option<(String, String)> {
    let rest = url.strip_prefix("data:")?;
    let (meta, data) = rest.split_once(',')?;
    let media_type = meta.strip_suffix(";base64")?;
    Some((media_type.to_owned(), data.to_owned()))
}

/// Parse a non-streaming Anthropic response into the canonical type (§4.4 Anthropic rule):
/// text blocks concatenate, `tool_use` blocks become tool calls, citations become
/// annotations, `thinking` blocks concatenate into `reasoning`, and each
/// `web_search_tool_result` block counts toward `webSearchCount` and contributes
/// annotations from its result items.
impl From<AnthropicResponse> for CompletionResponse {
    fn from(resp: AnthropicResponse) -> Self {
        let mut text = String::new();
        let mut reasoning = String::new();
        let mut tool_calls = Vec::new();
        let mut annotations = Vec::new();
        let mut web_search_count: u32 = 0;

        for block in resp.content {
            match block {
                AnthropicResponseBlock::Text { text: t, citations } => {
                    text.push_str(&t);
                    annotations.extend(citations.into_iter().filter_map(|c| {
                        Some(Annotation { annotation_type: "url_citation".to_owned(), url: c.url?, title: c.title })
                    }));
                }
                AnthropicResponseBlock::ToolUse { id, name, input } => {
                    tool_calls.push(build_tool_call(id, name, input.to_string()));
                }
                AnthropicResponseBlock::Thinking { thinking, .. } => {
                    reasoning.push_str(&thinking);
                }
                AnthropicResponseBlock::WebSearchToolResult { content, .. } => {
                    web_search_count += 1;
                    annotations.extend(content.into_iter().filter_map(|item| {
                        Some(Annotation { annotation_type: "url_citation".to_owned(), url: item.url?, title: item.title })
                    }));
                }
                AnthropicResponseBlock::Other => {}
            }
        }

        let finish_reason = resp.stop_reason.as_deref().and_then(parse_stop_reason);

        Self {
            id: resp.id,
            object: "chat.completion".to_owned(),
            created: 0,
            model: resp.model,
            choices: vec![crate::types::Choice {
                index: 0,
                message: ChoiceMessage {
                    role: "assistant".to_owned(),
                    content: (!text.is_empty()).then_some(text),
                    reasoning: (!reasoning.is_empty()).then_some(reasoning),
                    tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
                    images: Vec::new(),
                    annotations,
                },
                finish_reason,
            }],
            usage: Some(Usage {
                prompt_tokens: resp.usage.input_tokens,
                completion_tokens: resp.usage.output_tokens,
                total_tokens: resp.usage.input_tokens + resp.usage.output_tokens,
                reasoning_tokens: 0,
                cached_tokens: resp.usage.cache_read_input_tokens,
            }),
            web_search_count,
        }
    }
}

fn parse_stop_reason(s: &str) -> Option<FinishReason> {
    match s {
        "end_turn" | "stop_sequence" => Some(FinishReason::Stop),
        "max_tokens" => Some(FinishReason::Length),
        "tool_use" => Some(FinishReason::ToolCalls),
        _ => None,
    }
}

/// Parse an inbound client request against the `/v1/messages` surface into the
/// canonical type (§6), the reverse of `From<&CompletionRequest> for AnthropicRequest`.
impl From<AnthropicRequest> for CompletionRequest {
    fn from(req: AnthropicRequest) -> Self {
        let mut messages = Vec::new();
        if let Some(system) = req.system {
            messages.push(Message { role: Role::System, content: Content::Text(system), name: None, tool_calls: None, tool_call_id: None });
        }
        messages.extend(req.messages.into_iter().flat_map(anthropic_message_to_messages));

        let tools = req.tools.map(|tools| {
            tools
                .into_iter()
                .map(|t| ToolDefinition {
                    tool_type: "function".to_owned(),
                    function: FunctionDefinition { name: t.name, description: t.description, parameters: Some(t.input_schema) },
                })
                .collect()
        });

        let tool_choice = req.tool_choice.map(|choice| match choice.choice_type.as_str() {
            "any" => ToolChoice::Mode(ToolChoiceMode::Required),
            "tool" => ToolChoice::Function(ToolChoiceFunction {
                tool_type: "function".to_owned(),
                function: ToolChoiceFunctionName { name: choice.name.unwrap_or_default() },
            }),
            _ => ToolChoice::Mode(ToolChoiceMode::Auto),
        });

        Self {
            model: req.model,
            messages,
            params: CompletionParams {
                temperature: req.temperature,
                top_p: req.top_p,
                max_tokens: Some(req.max_tokens),
                stop: req.stop_sequences,
                frequency_penalty: None,
                presence_penalty: None,
                seed: None,
                reasoning_effort: None,
            },
            tools,
            tool_choice,
            stream: req.stream.unwrap_or(false),
            web_search: false,
        }
    }
}

/// An Anthropic message's content blocks may interleave text, images, tool uses, and
/// tool results; the canonical model keeps tool results as separate `Role::Tool`
/// messages, so one inbound message can expand into several canonical ones.
fn anthropic_message_to_messages(msg: AnthropicMessage) -> Vec<Message> {
    let role = if msg.role == "assistant" { Role::Assistant } else { Role::User };

    match msg.content {
        AnthropicContent::Text(text) => {
            vec![Message { role, content: Content::Text(text), name: None, tool_calls: None, tool_call_id: None }]
        }
        AnthropicContent::Blocks(blocks) => {
            let mut tool_results = Vec::new();
            let mut parts: Vec<ContentPart> = Vec::new();
            let mut tool_calls: Vec<ToolCall> = Vec::new();

            for block in blocks {
                match block {
                    AnthropicContentBlock::Text { text } => parts.push(ContentPart::Text { text }),
                    AnthropicContentBlock::Image { source } => {
                        let url = if source.source_type == "base64" {
                            format!("data:{};base64,{}", source.media_type.unwrap_or_default(), source.data)
                        } else {
                            source.data
                        };
                        parts.push(ContentPart::Image { url, detail: None });
                    }
                    AnthropicContentBlock::ToolUse { id, name, input } => {
                        tool_calls.push(ToolCall { id, function: FunctionCall { name, arguments: input.to_string() } });
                    }
                    AnthropicContentBlock::ToolResult { tool_use_id, content, is_error: _ } => {
                        tool_results.push(Message {
                            role: Role::Tool,
                            content: Content::Text(content.unwrap_or_default()),
                            name: None,
                            tool_calls: None,
                            tool_call_id: Some(tool_use_id),
                        });
                    }
                }
            }

            if !tool_calls.is_empty() {
                tool_results.push(Message {
                    role: Role::Assistant,
                    content: Content::Parts(parts),
                    name: None,
                    tool_calls: Some(tool_calls),
                    tool_call_id: None,
                });
            } else if !parts.is_empty() {
                tool_results.push(Message { role, content: Content::Parts(parts), name: None, tool_calls: None, tool_call_id: None });
            }

            tool_results
        }
    }
}

/// Serialize a canonical non-streaming response back out as an Anthropic `Message`
/// object (§6), the reverse of `From<AnthropicResponse> for CompletionResponse`.
impl From<CompletionResponse> for AnthropicResponse {
    fn from(resp: CompletionResponse) -> Self {
        let mut content = Vec::new();
        let mut stop_reason = None;

        if let Some(choice) = resp.choices.into_iter().next() {
            if let Some(thinking) = choice.message.reasoning {
                content.push(AnthropicResponseBlock::Thinking { thinking, signature: None });
            }
            if let Some(text) = choice.message.content {
                content.push(AnthropicResponseBlock::Text { text, citations: Vec::new() });
            }
            if let Some(tool_calls) = choice.message.tool_calls {
                for tc in tool_calls {
                    content.push(AnthropicResponseBlock::ToolUse {
                        id: tc.id,
                        name: tc.function.name,
                        input: serde_json::from_str(&tc.function.arguments).unwrap_or(serde_json::Value::Null),
                    });
                }
            }
            stop_reason = choice.finish_reason.as_ref().map(|r| finish_reason_to_anthropic_str(r).to_owned());
        }

        let usage = resp.usage.unwrap_or_default();

        Self {
            id: resp.id,
            response_type: "message".to_owned(),
            role: "assistant".to_owned(),
            content,
            model: resp.model,
            stop_reason,
            stop_sequence: None,
            usage: AnthropicUsage {
                input_tokens: usage.prompt_tokens,
                output_tokens: usage.completion_tokens,
                cache_read_input_tokens: usage.cached_tokens,
                server_tool_use: (resp.web_search_count > 0)
                    .then_some(AnthropicServerToolUse { web_search_requests: resp.web_search_count }),
            },
        }
    }
}

const fn finish_reason_to_anthropic_str(reason: &FinishReason) -> &'static str {
    match reason {
        FinishReason::Stop | FinishReason::Incomplete | FinishReason::ContentFilter => "end_turn",
        FinishReason::Length => "max_tokens",
        FinishReason::ToolCalls => "tool_use",
    }
}

/// Per-stream accumulator turning canonical `StreamEvent`s into outbound Anthropic SSE
/// events for the `/v1/messages` surface (§4.5, §6), the reverse of `AnthropicStreamState`.
///
/// Anthropic requires an explicit `content_block_start`/`_delta`/`_stop` sequence per
/// index wrapped in a `message_start`/`message_delta`/`message_stop` envelope, so this
/// tracks which indices have been opened and closes them all out on `StreamEvent::Done`.
#[derive(Debug, Default)]
pub struct CanonicalStreamState {
    started: bool,
    open_indices: HashSet<u32>,
}

impl CanonicalStreamState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle(&mut self, event: &StreamEvent, id: &str, model: &str) -> Vec<AnthropicStreamEvent> {
        let mut out = Vec::new();
        if !self.started {
            self.started = true;
            out.push(AnthropicStreamEvent::MessageStart {
                message: AnthropicStreamMessage {
                    id: id.to_owned(),
                    message_type: "message".to_owned(),
                    role: "assistant".to_owned(),
                    model: model.to_owned(),
                    usage: None,
                },
            });
        }

        match event {
            StreamEvent::Delta(delta) => {
                if let Some(content) = &delta.content {
                    if self.open_indices.insert(delta.index) {
                        out.push(AnthropicStreamEvent::ContentBlockStart {
                            index: delta.index,
                            content_block: AnthropicStreamContentBlock::Text { text: String::new() },
                        });
                    }
                    out.push(AnthropicStreamEvent::ContentBlockDelta {
                        index: delta.index,
                        delta: AnthropicStreamDelta::TextDelta { text: content.clone() },
                    });
                }
                if let Some(reasoning) = &delta.reasoning {
                    if self.open_indices.insert(delta.index) {
                        out.push(AnthropicStreamEvent::ContentBlockStart {
                            index: delta.index,
                            content_block: AnthropicStreamContentBlock::Thinking { thinking: String::new() },
                        });
                    }
                    out.push(AnthropicStreamEvent::ContentBlockDelta {
                        index: delta.index,
                        delta: AnthropicStreamDelta::ThinkingDelta { thinking: reasoning.clone() },
                    });
                }
                if let Some(tc) = &delta.tool_call {
                    if let (Some(tc_id), Some(func)) = (&tc.id, &tc.function) {
                        self.open_indices.insert(tc.index);
                        out.push(AnthropicStreamEvent::ContentBlockStart {
                            index: tc.index,
                            content_block: AnthropicStreamContentBlock::ToolUse {
                                id: tc_id.clone(),
                                name: func.name.clone().unwrap_or_default(),
                                input: serde_json::Value::Null,
                            },
                        });
                    }
                    if let Some(args) = tc.function.as_ref().and_then(|f| f.arguments.clone()) {
                        out.push(AnthropicStreamEvent::ContentBlockDelta {
                            index: tc.index,
                            delta: AnthropicStreamDelta::InputJsonDelta { partial_json: args },
                        });
                    }
                }
                if let Some(reason) = &delta.finish_reason {
                    out.push(AnthropicStreamEvent::MessageDelta {
                        delta: AnthropicMessageDelta {
                            stop_reason: Some(finish_reason_to_anthropic_str(reason).to_owned()),
                            stop_sequence: None,
                        },
                        usage: None,
                    });
                }
            }
            StreamEvent::Usage(usage) => {
                out.push(AnthropicStreamEvent::MessageDelta {
                    delta: AnthropicMessageDelta { stop_reason: None, stop_sequence: None },
                    usage: Some(AnthropicUsage {
                        input_tokens: usage.prompt_tokens,
                        output_tokens: usage.completion_tokens,
                        cache_read_input_tokens: usage.cached_tokens,
                        server_tool_use: None,
                    }),
                });
            }
            StreamEvent::Done => {
                let indices: Vec<u32> = self.open_indices.drain().collect();
                for index in indices {
                    out.push(AnthropicStreamEvent::ContentBlockStop { index });
                }
                out.push(AnthropicStreamEvent::MessageStop);
            }
        }

        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OpenBlock {
    Text,
    ToolUse,
    Thinking,
}

/// Per-stream accumulator for Anthropic's indexed `content_block_*` events.
///
/// Anthropic streams `input_json_delta` fragments that only form valid JSON once
/// fully concatenated; this tracks which block kind is open at each index so a
/// `ToolUse` delta is only ever surfaced through `StreamToolCall.function`, never
/// as a `content` fragment, and the opening id/name pair is emitted exactly once
/// (§4.5, §9 ordering invariant).
#[derive(Debug, Default)]
pub struct AnthropicStreamState {
    open_blocks: HashMap<u32, OpenBlock>,
}

impl AnthropicStreamState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle(&mut self, event: AnthropicStreamEvent) -> Vec<StreamEvent> {
        match event {
            AnthropicStreamEvent::ContentBlockStart { index, content_block } => match content_block {
                AnthropicStreamContentBlock::Text { text } => {
                    self.open_blocks.insert(index, OpenBlock::Text);
                    vec![StreamEvent::Delta(StreamDelta {
                        index,
                        content: (!text.is_empty()).then_some(text),
                        reasoning: None,
                        tool_call: None,
                        images: Vec::new(),
                        annotations: Vec::new(),
                        finish_reason: None,
                    })]
                }
                AnthropicStreamContentBlock::ToolUse { id, name, .. } => {
                    self.open_blocks.insert(index, OpenBlock::ToolUse);
                    vec![StreamEvent::Delta(StreamDelta {
                        index,
                        content: None,
                        reasoning: None,
                        tool_call: Some(StreamToolCall {
                            index,
                            id: Some(id),
                            function: Some(StreamFunctionCall { name: Some(name), arguments: None }),
                        }),
                        images: Vec::new(),
                        annotations: Vec::new(),
                        finish_reason: None,
                    })]
                }
                AnthropicStreamContentBlock::Thinking { thinking } => {
                    self.open_blocks.insert(index, OpenBlock::Thinking);
                    vec![StreamEvent::Delta(StreamDelta {
                        index,
                        content: None,
                        reasoning: (!thinking.is_empty()).then_some(thinking),
                        tool_call: None,
                        images: Vec::new(),
                        annotations: Vec::new(),
                        finish_reason: None,
                    })]
                }
                AnthropicStreamContentBlock::WebSearchToolResult { content, .. } => {
                    let annotations = content
                        .into_iter()
                        .filter_map(|item| {
                            Some(Annotation { annotation_type: "url_citation".to_owned(), url: item.url?, title: item.title })
                        })
                        .collect();
                    vec![StreamEvent::Delta(StreamDelta {
                        index,
                        content: None,
                        reasoning: None,
                        tool_call: None,
                        images: Vec::new(),
                        annotations,
                        finish_reason: None,
                    })]
                }
                AnthropicStreamContentBlock::Other => Vec::new(),
            },
            AnthropicStreamEvent::ContentBlockDelta { index, delta } => match delta {
                AnthropicStreamDelta::TextDelta { text } => vec![StreamEvent::Delta(StreamDelta {
                    index,
                    content: Some(text),
                    reasoning: None,
                    tool_call: None,
                    images: Vec::new(),
                    annotations: Vec::new(),
                    finish_reason: None,
                })],
                AnthropicStreamDelta::ThinkingDelta { thinking } => vec![StreamEvent::Delta(StreamDelta {
                    index,
                    content: None,
                    reasoning: Some(thinking),
                    tool_call: None,
                    images: Vec::new(),
                    annotations: Vec::new(),
                    finish_reason: None,
                })],
                AnthropicStreamDelta::InputJsonDelta { partial_json } => vec![StreamEvent::Delta(StreamDelta {
                    index,
                    content: None,
                    reasoning: None,
                    tool_call: Some(StreamToolCall {
                        index,
                        id: None,
                        function: Some(StreamFunctionCall { name: None, arguments: Some(partial_json) }),
                    }),
                    images: Vec::new(),
                    annotations: Vec::new(),
                    finish_reason: None,
                })],
                AnthropicStreamDelta::Other => Vec::new(),
            },
            AnthropicStreamEvent::ContentBlockStop { index } => {
                self.open_blocks.remove(&index);
                Vec::new()
            }
            AnthropicStreamEvent::MessageDelta { delta, usage } => {
                let mut events = Vec::new();
                if let Some(reason) = delta.stop_reason.as_deref().and_then(parse_stop_reason) {
                    events.push(StreamEvent::Delta(StreamDelta {
                        index: 0,
                        content: None,
                        reasoning: None,
                        tool_call: None,
                        images: Vec::new(),
                        annotations: Vec::new(),
                        finish_reason: Some(reason),
                    }));
                }
                if let Some(usage) = usage {
                    events.push(StreamEvent::Usage(Usage {
                        prompt_tokens: 0,
                        completion_tokens: usage.output_tokens,
                        total_tokens: usage.output_tokens,
                        reasoning_tokens: 0,
                        cached_tokens: usage.cache_read_input_tokens,
                    }));
                }
                events
            }
            AnthropicStreamEvent::MessageStart { message } => message
                .usage
                .map(|usage| {
                    vec![StreamEvent::Usage(Usage {
                        prompt_tokens: usage.input_tokens,
                        completion_tokens: 0,
                        total_tokens: usage.input_tokens,
                        reasoning_tokens: 0,
                        cached_tokens: usage.cache_read_input_tokens,
                    })]
                })
                .unwrap_or_default(),
            AnthropicStreamEvent::MessageStop => vec![StreamEvent::Done],
            AnthropicStreamEvent::Ping | AnthropicStreamEvent::Other => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_use_open_then_delta_never_repeats_id() {
        let mut state = AnthropicStreamState::new();
        let opened = state.handle(AnthropicStreamEvent::ContentBlockStart {
            index: 0,
            content_block: AnthropicStreamContentBlock::ToolUse {
                id: "call_1".into(),
                name: "lookup".into(),
                input: serde_json::Value::Null,
            },
        });
        let StreamEvent::Delta(delta) = &opened[0] else { panic!("expected delta") };
        assert_eq!(delta.tool_call.as_ref().unwrap().id.as_deref(), Some("call_1"));

        let appended = state.handle(AnthropicStreamEvent::ContentBlockDelta {
            index: 0,
            delta: AnthropicStreamDelta::InputJsonDelta { partial_json: "{\"q\":1}".into() },
        });
        let StreamEvent::Delta(delta) = &appended[0] else { panic!("expected delta") };
        assert!(delta.tool_call.as_ref().unwrap().id.is_none());
        assert_eq!(delta.tool_call.as_ref().unwrap().function.as_ref().unwrap().arguments.as_deref(), Some("{\"q\":1}"));
    }

    #[test]
    fn message_stop_emits_done() {
        let mut state = AnthropicStreamState::new();
        let events = state.handle(AnthropicStreamEvent::MessageStop);
        assert!(matches!(events[0], StreamEvent::Done));
    }

    #[test]
    fn message_delta_usage_carries_output_tokens() {
        let mut state = AnthropicStreamState::new();
        let events = state.handle(AnthropicStreamEvent::MessageDelta {
            delta: AnthropicMessageDelta { stop_reason: Some("end_turn".into()), stop_sequence: None },
            usage: Some(AnthropicUsage { input_tokens: 0, output_tokens: 42, cache_read_input_tokens: 0, server_tool_use: None }),
        });
        assert!(events.iter().any(|e| matches!(e, StreamEvent::Usage(u) if u.completion_tokens == 42)));
    }

    #[test]
    fn client_request_hoists_system_and_splits_tool_result() {
        let req = AnthropicRequest {
            model: "claude-3-5-sonnet-20241022".into(),
            max_tokens: 1024,
            system: Some("be terse".into()),
            messages: vec![
                AnthropicMessage { role: "user".into(), content: AnthropicContent::Text("what's 2+2?".into()) },
                AnthropicMessage {
                    role: "assistant".into(),
                    content: AnthropicContent::Blocks(vec![AnthropicContentBlock::ToolUse {
                        id: "call_1".into(),
                        name: "calc".into(),
                        input: serde_json::json!({"expr": "2+2"}),
                    }]),
                },
                AnthropicMessage {
                    role: "user".into(),
                    content: AnthropicContent::Blocks(vec![AnthropicContentBlock::ToolResult {
                        tool_use_id: "call_1".into(),
                        content: Some("4".into()),
                        is_error: None,
                    }]),
                },
            ],
            temperature: None,
            top_p: None,
            stop_sequences: None,
            stream: None,
            tools: None,
            tool_choice: None,
        };

        let canonical: CompletionRequest = req.into();
        assert_eq!(canonical.messages.len(), 4);
        assert_eq!(canonical.messages[0].role, Role::System);
        assert_eq!(canonical.messages[2].tool_calls.as_ref().unwrap()[0].id, "call_1");
        assert_eq!(canonical.messages[3].role, Role::Tool);
        assert_eq!(canonical.messages[3].tool_call_id.as_deref(), Some("call_1"));
    }

    #[test]
    fn tool_choice_any_maps_to_required() {
        let req = AnthropicRequest {
            model: "claude-3-5-sonnet-20241022".into(),
            max_tokens: 1024,
            system: None,
            messages: vec![AnthropicMessage { role: "user".into(), content: AnthropicContent::Text("hi".into()) }],
            temperature: None,
            top_p: None,
            stop_sequences: None,
            stream: None,
            tools: None,
            tool_choice: Some(AnthropicToolChoice { choice_type: "any".into(), name: None }),
        };
        let canonical: CompletionRequest = req.into();
        assert!(matches!(canonical.tool_choice, Some(ToolChoice::Mode(ToolChoiceMode::Required))));
    }

    #[test]
    fn response_round_trips_tool_call_into_tool_use_block() {
        let resp = CompletionResponse {
            id: "msg_1".into(),
            object: "chat.completion".into(),
            created: 0,
            model: "claude-3-5-sonnet-20241022".into(),
            choices: vec![crate::types::Choice {
                index: 0,
                message: ChoiceMessage::with_tool_calls(vec![build_tool_call("call_1".into(), "calc".into(), "{}".into())]),
                finish_reason: Some(FinishReason::ToolCalls),
            }],
            usage: Some(Usage { prompt_tokens: 10, completion_tokens: 5, total_tokens: 15, reasoning_tokens: 0, cached_tokens: 0 }),
            web_search_count: 0,
        };

        let anthropic: AnthropicResponse = resp.into();
        assert_eq!(anthropic.stop_reason.as_deref(), Some("tool_use"));
        assert!(matches!(anthropic.content[0], AnthropicResponseBlock::ToolUse { .. }));
    }

    #[test]
    fn canonical_stream_opens_block_once_then_emits_stop_on_done() {
        let mut state = CanonicalStreamState::new();
        let start = state.handle(
            &StreamEvent::Delta(StreamDelta {
                index: 0,
                content: Some("hi".into()),
                reasoning: None,
                tool_call: None,
                images: Vec::new(),
                annotations: Vec::new(),
                finish_reason: None,
            }),
            "msg_1",
            "claude-3-5-sonnet-20241022",
        );
        assert!(matches!(start[0], AnthropicStreamEvent::MessageStart { .. }));
        assert!(matches!(start[1], AnthropicStreamEvent::ContentBlockStart { .. }));
        assert!(matches!(start[2], AnthropicStreamEvent::ContentBlockDelta { .. }));

        let again = state.handle(
            &StreamEvent::Delta(StreamDelta {
                index: 0,
                content: Some(" there".into()),
                reasoning: None,
                tool_call: None,
                images: Vec::new(),
                annotations: Vec::new(),
                finish_reason: None,
            }),
            "msg_1",
            "claude-3-5-sonnet-20241022",
        );
        assert_eq!(again.len(), 1);
        assert!(matches!(again[0], AnthropicStreamEvent::ContentBlockDelta { .. }));

        let done = state.handle(&StreamEvent::Done, "msg_1", "claude-3-5-sonnet-20241022");
        assert!(matches!(done[0], AnthropicStreamEvent::ContentBlockStop { index: 0 }));
        assert!(matches!(done[1], AnthropicStreamEvent::MessageStop));
    }

    #[test]
    fn thinking_block_becomes_reasoning_not_content() {
        let resp = AnthropicResponse {
            id: "msg_1".into(),
            response_type: "message".into(),
            role: "assistant".into(),
            content: vec![
                AnthropicResponseBlock::Thinking { thinking: "because".into(), signature: None },
                AnthropicResponseBlock::Text { text: "42".into(), citations: Vec::new() },
            ],
            model: "claude-3-5-sonnet-20241022".into(),
            stop_reason: Some("end_turn".into()),
            stop_sequence: None,
            usage: AnthropicUsage { input_tokens: 1, output_tokens: 1, cache_read_input_tokens: 0, server_tool_use: None },
        };
        let completion: CompletionResponse = resp.into();
        let message = &completion.choices[0].message;
        assert_eq!(message.reasoning.as_deref(), Some("because"));
        assert_eq!(message.content.as_deref(), Some("42"));
    }

    #[test]
    fn web_search_tool_result_blocks_are_counted_and_annotated() {
        let resp = AnthropicResponse {
            id: "msg_1".into(),
            response_type: "message".into(),
            role: "assistant".into(),
            content: vec![
                AnthropicResponseBlock::WebSearchToolResult {
                    tool_use_id: "call_1".into(),
                    content: vec![AnthropicWebSearchResultItem { url: Some("https://example.com".into()), title: Some("Example".into()) }],
                },
                AnthropicResponseBlock::Text { text: "done".into(), citations: Vec::new() },
            ],
            model: "claude-3-5-sonnet-20241022".into(),
            stop_reason: Some("end_turn".into()),
            stop_sequence: None,
            usage: AnthropicUsage { input_tokens: 1, output_tokens: 1, cache_read_input_tokens: 0, server_tool_use: None },
        };
        let completion: CompletionResponse = resp.into();
        assert_eq!(completion.web_search_count, 1);
        assert_eq!(completion.choices[0].message.annotations.len(), 1);
        assert_eq!(completion.choices[0].message.annotations[0].url, "https://example.com");
    }

    #[test]
    fn reasoning_round_trips_to_thinking_block() {
        let resp = CompletionResponse {
            id: "msg_1".into(),
            object: "chat.completion".into(),
            created: 0,
            model: "claude-3-5-sonnet-20241022".into(),
            choices: vec![crate::types::Choice {
                index: 0,
                message: ChoiceMessage { reasoning: Some("because".into()), ..ChoiceMessage::text("42".into()) },
                finish_reason: Some(FinishReason::Stop),
            }],
            usage: None,
            web_search_count: 0,
        };
        let anthropic: AnthropicResponse = resp.into();
        assert!(matches!(&anthropic.content[0], AnthropicResponseBlock::Thinking { thinking, .. } if thinking == "because"));
        assert!(matches!(&anthropic.content[1], AnthropicResponseBlock::Text { text, .. } if text == "42"));
    }

    #[test]
    fn streaming_thinking_delta_becomes_reasoning() {
        let mut state = AnthropicStreamState::new();
        let opened = state.handle(AnthropicStreamEvent::ContentBlockStart {
            index: 0,
            content_block: AnthropicStreamContentBlock::Thinking { thinking: String::new() },
        });
        let StreamEvent::Delta(delta) = &opened[0] else { panic!("expected delta") };
        assert!(delta.reasoning.is_none());

        let appended = state.handle(AnthropicStreamEvent::ContentBlockDelta {
            index: 0,
            delta: AnthropicStreamDelta::ThinkingDelta { thinking: "because".into() },
        });
        let StreamEvent::Delta(delta) = &appended[0] else { panic!("expected delta") };
        assert_eq!(delta.reasoning.as_deref(), Some("because"));
        assert!(delta.content.is_none());
    }

    #[test]
    fn canonical_reasoning_delta_opens_thinking_block() {
        let mut state = CanonicalStreamState::new();
        let events = state.handle(
            &StreamEvent::Delta(StreamDelta {
                index: 0,
                content: None,
                reasoning: Some("because".into()),
                tool_call: None,
                images: Vec::new(),
                annotations: Vec::new(),
                finish_reason: None,
            }),
            "msg_1",
            "claude-3-5-sonnet-20241022",
        );
        assert!(events.iter().any(|e| matches!(
            e,
            AnthropicStreamEvent::ContentBlockStart { content_block: AnthropicStreamContentBlock::Thinking { .. }, .. }
        )));
        assert!(events.iter().any(|e| matches!(
            e,
            AnthropicStreamEvent::ContentBlockDelta { delta: AnthropicStreamDelta::ThinkingDelta { thinking }, .. } if thinking == "because"
        )));
    }
}
