//! Conversion between internal types and the OpenAI chat-completions wire format,
//! shared by every OpenAI-compatible adapter (§9).

use crate::protocol::openai::{
    OpenAiChoice, OpenAiChoiceMessage, OpenAiCompletionTokensDetails, OpenAiContent, OpenAiContentPart, OpenAiFunction,
    OpenAiFunctionCall, OpenAiImageUrl, OpenAiMessage, OpenAiPromptTokensDetails, OpenAiRequest, OpenAiResponse,
    OpenAiStreamChoice, OpenAiStreamChunk, OpenAiStreamDelta, OpenAiStreamFunctionCall, OpenAiStreamOptions,
    OpenAiStreamToolCall, OpenAiTool, OpenAiToolCall, OpenAiUsage,
};
use crate::types::{
    Choice, ChoiceMessage, CompletionParams, CompletionRequest, CompletionResponse, Content, ContentPart,
    FinishReason, FunctionCall, FunctionDefinition, Message, Role, StreamDelta, StreamEvent, StreamFunctionCall,
    StreamToolCall, ToolCall, ToolChoice, ToolChoiceFunction, ToolChoiceFunctionName, ToolChoiceMode, ToolDefinition,
    Usage,
};

impl From<&CompletionRequest> for OpenAiRequest {
    fn from(req: &CompletionRequest) -> Self {
        Self {
            model: req.model.clone(),
            messages: req.messages.iter().map(Into::into).collect(),
            temperature: req.params.temperature,
            top_p: req.params.top_p,
            max_tokens: req.params.max_tokens,
            stop: req.params.stop.clone(),
            frequency_penalty: req.params.frequency_penalty,
            presence_penalty: req.params.presence_penalty,
            seed: req.params.seed,
            stream: req.stream.then_some(true),
            tools: req.tools.as_ref().map(|tools| tools.iter().map(Into::into).collect()),
            tool_choice: req.tool_choice.as_ref().map(tool_choice_to_openai_value),
            stream_options: req.stream.then_some(OpenAiStreamOptions { include_usage: true }),
            reasoning_effort: req.params.reasoning_effort.clone(),
            web_search_options: req.web_search.then(|| serde_json::json!({})),
        }
    }
}

impl From<&Message> for OpenAiMessage {
    fn from(msg: &Message) -> Self {
        let role = match msg.role {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        };

        let content = match &msg.content {
            Content::Text(text) => Some(OpenAiContent::Text(text.clone())),
            Content::Parts(parts) => Some(OpenAiContent::Parts(parts.iter().map(Into::into).collect())),
        };

        let tool_calls = msg.tool_calls.as_ref().map(|calls| calls.iter().map(Into::into).collect());

        Self {
            role: role.to_owned(),
            content,
            name: msg.name.clone(),
            tool_calls,
            tool_call_id: msg.tool_call_id.clone(),
        }
    }
}

impl From<&ToolCall> for OpenAiToolCall {
    fn from(tc: &ToolCall) -> Self {
        Self {
            id: tc.id.clone(),
            tool_type: "function".to_owned(),
            function: OpenAiFunctionCall { name: tc.function.name.clone(), arguments: tc.function.arguments.clone() },
        }
    }
}

impl From<&ContentPart> for OpenAiContentPart {
    fn from(part: &ContentPart) -> Self {
        match part {
            ContentPart::Text { text } => Self::Text { text: text.clone() },
            ContentPart::Image { url, detail } => {
                Self::ImageUrl { image_url: OpenAiImageUrl { url: url.clone(), detail: detail.clone() } }
            }
        }
    }
}

impl From<&ToolDefinition> for OpenAiTool {
    fn from(tool: &ToolDefinition) -> Self {
        Self {
            tool_type: tool.tool_type.clone(),
            function: OpenAiFunction {
                name: tool.function.name.clone(),
                description: tool.function.description.clone(),
                parameters: tool.function.parameters.clone(),
            },
        }
    }
}

fn tool_choice_to_openai_value(choice: &ToolChoice) -> serde_json::Value {
    match choice {
        ToolChoice::Mode(mode) => {
            let s = match mode {
                ToolChoiceMode::None => "none",
                ToolChoiceMode::Auto => "auto",
                ToolChoiceMode::Required => "required",
            };
            serde_json::Value::String(s.to_owned())
        }
        ToolChoice::Function(func) => {
            serde_json::json!({ "type": func.tool_type, "function": { "name": func.function.name } })
        }
    }
}

/// Parse an `OpenAI`-shaped response into the canonical type (§4.4 default family rule,
/// with the DeepSeek-style `reasoning_content` variant folded in unconditionally — a
/// field the canonical spec absent response simply carries as `None`).
impl From<OpenAiResponse> for CompletionResponse {
    fn from(resp: OpenAiResponse) -> Self {
        Self {
            id: resp.id,
            object: resp.object,
            created: resp.created,
            model: resp.model,
            choices: resp.choices.into_iter().map(Into::into).collect(),
            usage: resp.usage.map(Into::into),
            web_search_count: 0,
        }
    }
}

impl From<OpenAiChoice> for Choice {
    fn from(choice: OpenAiChoice) -> Self {
        let finish_reason = choice.finish_reason.as_deref().and_then(parse_finish_reason);
        let tool_calls = choice.message.tool_calls.map(|calls| calls.into_iter().map(Into::into).collect());
        Self {
            index: choice.index,
            message: ChoiceMessage {
                role: choice.message.role,
                content: choice.message.content,
                reasoning: choice.message.reasoning.or(choice.message.reasoning_content),
                tool_calls,
                images: Vec::new(),
                annotations: Vec::new(),
            },
            finish_reason,
        }
    }
}

impl From<OpenAiToolCall> for ToolCall {
    fn from(tc: OpenAiToolCall) -> Self {
        Self { id: tc.id, function: FunctionCall { name: tc.function.name, arguments: tc.function.arguments } }
    }
}

impl From<OpenAiUsage> for Usage {
    fn from(usage: OpenAiUsage) -> Self {
        Self {
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens,
            reasoning_tokens: usage.completion_tokens_details.map(|d| d.reasoning_tokens).unwrap_or_default(),
            cached_tokens: usage.prompt_tokens_details.map(|d| d.cached_tokens).unwrap_or_default(),
        }
    }
}

/// Parse a client-facing OpenAI-shaped request into the canonical type (§6 `/v1/chat/completions`).
impl From<OpenAiRequest> for CompletionRequest {
    fn from(req: OpenAiRequest) -> Self {
        Self {
            model: req.model,
            messages: req.messages.into_iter().map(Into::into).collect(),
            params: CompletionParams {
                temperature: req.temperature,
                top_p: req.top_p,
                max_tokens: req.max_tokens,
                stop: req.stop,
                frequency_penalty: req.frequency_penalty,
                presence_penalty: req.presence_penalty,
                seed: req.seed,
                reasoning_effort: req.reasoning_effort,
            },
            tools: req.tools.map(|tools| tools.into_iter().map(Into::into).collect()),
            tool_choice: req.tool_choice.as_ref().and_then(openai_value_to_tool_choice),
            stream: req.stream.unwrap_or(false),
            web_search: req.web_search_options.is_some(),
        }
    }
}

impl From<OpenAiMessage> for Message {
    fn from(msg: OpenAiMessage) -> Self {
        let role = match msg.role.as_str() {
            "system" | "developer" => Role::System,
            "assistant" => Role::Assistant,
            "tool" => Role::Tool,
            _ => Role::User,
        };

        let content = match msg.content {
            Some(OpenAiContent::Text(text)) => Content::Text(text),
            Some(OpenAiContent::Parts(parts)) => Content::Parts(parts.into_iter().map(Into::into).collect()),
            None => Content::Text(String::new()),
        };

        Self {
            role,
            content,
            name: msg.name,
            tool_calls: msg.tool_calls.map(|calls| calls.into_iter().map(Into::into).collect()),
            tool_call_id: msg.tool_call_id,
        }
    }
}

impl From<OpenAiContentPart> for ContentPart {
    fn from(part: OpenAiContentPart) -> Self {
        match part {
            OpenAiContentPart::Text { text } => Self::Text { text },
            OpenAiContentPart::ImageUrl { image_url } => Self::Image { url: image_url.url, detail: image_url.detail },
        }
    }
}

impl From<OpenAiTool> for ToolDefinition {
    fn from(tool: OpenAiTool) -> Self {
        Self {
            tool_type: tool.tool_type,
            function: FunctionDefinition {
                name: tool.function.name,
                description: tool.function.description,
                parameters: tool.function.parameters,
            },
        }
    }
}

fn openai_value_to_tool_choice(value: &serde_json::Value) -> Option<ToolChoice> {
    match value {
        serde_json::Value::String(s) => match s.as_str() {
            "none" => Some(ToolChoice::Mode(ToolChoiceMode::None)),
            "required" => Some(ToolChoice::Mode(ToolChoiceMode::Required)),
            _ => Some(ToolChoice::Mode(ToolChoiceMode::Auto)),
        },
        serde_json::Value::Object(_) => {
            let name = value.get("function")?.get("name")?.as_str()?.to_owned();
            Some(ToolChoice::Function(ToolChoiceFunction {
                tool_type: "function".to_owned(),
                function: ToolChoiceFunctionName { name },
            }))
        }
        _ => None,
    }
}

/// Render the canonical response as an OpenAI `chat.completion` object for the client
/// surface (§6 `/v1/chat/completions` non-streaming branch).
impl From<CompletionResponse> for OpenAiResponse {
    fn from(resp: CompletionResponse) -> Self {
        Self {
            id: resp.id,
            object: resp.object,
            created: resp.created,
            model: resp.model,
            choices: resp.choices.into_iter().map(Into::into).collect(),
            usage: resp.usage.map(Into::into),
        }
    }
}

impl From<Choice> for OpenAiChoice {
    fn from(choice: Choice) -> Self {
        Self {
            index: choice.index,
            message: OpenAiChoiceMessage {
                role: choice.message.role,
                content: choice.message.content,
                reasoning: None,
                reasoning_content: choice.message.reasoning,
                tool_calls: choice.message.tool_calls.map(|calls| calls.iter().map(Into::into).collect()),
                web_search: None,
            },
            finish_reason: choice.finish_reason.as_ref().map(finish_reason_to_openai_str).map(str::to_owned),
        }
    }
}

impl From<Usage> for OpenAiUsage {
    fn from(usage: Usage) -> Self {
        Self {
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens,
            completion_tokens_details: Some(OpenAiCompletionTokensDetails { reasoning_tokens: usage.reasoning_tokens }),
            prompt_tokens_details: Some(OpenAiPromptTokensDetails { cached_tokens: usage.cached_tokens }),
        }
    }
}

const fn finish_reason_to_openai_str(reason: &FinishReason) -> &'static str {
    match reason {
        FinishReason::Stop => "stop",
        FinishReason::Length => "length",
        FinishReason::ToolCalls => "tool_calls",
        FinishReason::ContentFilter => "content_filter",
        FinishReason::Incomplete => "incomplete",
    }
}

/// Render one canonical stream event as an OpenAI `chat.completion.chunk` object for the
/// client surface's SSE stream (§4.5/§6). Returns `None` for `StreamEvent::Done`, which
/// carries no payload of its own — the caller emits the terminal `data: [DONE]` line.
#[must_use]
pub fn canonical_event_to_openai_chunk(event: &StreamEvent, id: &str, model: &str, created: u64) -> Option<OpenAiStreamChunk> {
    match event {
        StreamEvent::Delta(delta) => Some(OpenAiStreamChunk {
            id: id.to_owned(),
            object: "chat.completion.chunk".to_owned(),
            created,
            model: model.to_owned(),
            choices: vec![OpenAiStreamChoice {
                index: delta.index,
                delta: OpenAiStreamDelta {
                    role: (delta.content.is_some() || delta.tool_call.is_some()).then(|| "assistant".to_owned()),
                    content: delta.content.clone(),
                    reasoning_content: delta.reasoning.clone(),
                    tool_calls: delta.tool_call.as_ref().map(|tc| {
                        vec![OpenAiStreamToolCall {
                            index: tc.index,
                            id: tc.id.clone(),
                            tool_type: tc.id.as_ref().map(|_| "function".to_owned()),
                            function: tc.function.as_ref().map(|f| OpenAiStreamFunctionCall {
                                name: f.name.clone(),
                                arguments: f.arguments.clone(),
                            }),
                        }]
                    }),
                },
                finish_reason: delta.finish_reason.as_ref().map(finish_reason_to_openai_str).map(str::to_owned),
            }],
            usage: None,
        }),
        StreamEvent::Usage(usage) => Some(OpenAiStreamChunk {
            id: id.to_owned(),
            object: "chat.completion.chunk".to_owned(),
            created,
            model: model.to_owned(),
            choices: Vec::new(),
            usage: Some(usage.clone().into()),
        }),
        StreamEvent::Done => None,
    }
}

fn parse_finish_reason(s: &str) -> Option<FinishReason> {
    match s {
        "stop" | "end_turn" => Some(FinishReason::Stop),
        "length" | "max_tokens" => Some(FinishReason::Length),
        "tool_calls" | "tool_use" => Some(FinishReason::ToolCalls),
        "content_filter" => Some(FinishReason::ContentFilter),
        "incomplete" => Some(FinishReason::Incomplete),
        _ => None,
    }
}

/// Convert one OpenAI-shaped SSE chunk into zero or more canonical stream events (§4.5).
pub fn openai_chunk_to_events(chunk: OpenAiStreamChunk) -> Vec<StreamEvent> {
    let mut events: Vec<StreamEvent> = chunk.choices.into_iter().map(openai_stream_choice_to_delta).map(StreamEvent::Delta).collect();

    if let Some(usage) = chunk.usage {
        events.push(StreamEvent::Usage(usage.into()));
    }

    events
}

fn openai_stream_choice_to_delta(choice: OpenAiStreamChoice) -> StreamDelta {
    let finish_reason = choice.finish_reason.as_deref().and_then(parse_finish_reason);

    let tool_call = choice.delta.tool_calls.into_iter().flatten().next().map(|tc| StreamToolCall {
        index: tc.index,
        id: tc.id,
        function: tc.function.map(|f| StreamFunctionCall { name: f.name, arguments: f.arguments }),
    });

    StreamDelta {
        index: choice.index,
        content: choice.delta.content,
        reasoning: choice.delta.reasoning_content,
        tool_call,
        images: Vec::new(),
        annotations: Vec::new(),
        finish_reason,
    }
}
