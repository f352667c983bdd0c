//! Conversion between internal types and the Google Generative Language wire format (§4.4/§4.5).
//!
//! Grounded on the teacher's `crates/synapse-llm/src/convert/google.rs` for the outbound
//! request shape; the inbound side is modeled fresh against §4.4's per-family rule since
//! the teacher's `GoogleResponse -> CompletionResponse` conversion has no reasoning,
//! image, annotation, or token-accounting handling to build on. Stays pure — Redis
//! persistence of `thoughtSignature`s is the caller's job (`provider::google`), not this
//! module's; `google_response_to_completion`/`google_chunk_to_events` return the
//! `(tool_call_id, signature)` pairs that need caching rather than caching them directly.

use crate::cost::estimate_tokens;
use crate::protocol::google::{
    GoogleCandidate, GoogleContent, GoogleFunctionCall, GoogleFunctionCallingConfig, GoogleFunctionDeclaration,
    GoogleFunctionResponse, GoogleGenerationConfig, GoogleInlineData, GooglePart, GoogleRequest, GoogleResponse,
    GoogleStreamChunk, GoogleTool, GoogleToolConfig,
};
use crate::types::{
    build_tool_call, Annotation, Choice, ChoiceMessage, CompletionRequest, CompletionResponse, Content, ContentPart,
    FinishReason, Image, Message, Role, StreamDelta, StreamEvent, StreamToolCall, ToolChoice, ToolChoiceMode, Usage,
};

// -- Outbound: internal request -> Google wire request --

impl From<&CompletionRequest> for GoogleRequest {
    fn from(req: &CompletionRequest) -> Self {
        let mut system_instruction = None;
        let mut contents = Vec::new();

        for msg in &req.messages {
            match msg.role {
                Role::System => {
                    system_instruction = Some(GoogleContent { role: None, parts: vec![GooglePart::text(msg.content.as_text())] });
                }
                Role::User => contents.push(internal_message_to_google(msg, "user")),
                Role::Assistant => contents.push(internal_message_to_google(msg, "model")),
                Role::Tool => {
                    if let Some(tool_call_id) = &msg.tool_call_id {
                        let response_value = serde_json::from_str(&msg.content.as_text())
                            .unwrap_or_else(|_| serde_json::json!({ "result": msg.content.as_text() }));
                        contents.push(GoogleContent {
                            role: Some("function".to_owned()),
                            parts: vec![GooglePart {
                                function_response: Some(GoogleFunctionResponse { name: tool_call_id.clone(), response: response_value }),
                                ..GooglePart::default()
                            }],
                        });
                    }
                }
            }
        }

        let generation_config = Some(GoogleGenerationConfig {
            temperature: req.params.temperature,
            top_p: req.params.top_p,
            max_output_tokens: req.params.max_tokens,
            stop_sequences: req.params.stop.clone(),
        });

        let tools = req.tools.as_ref().map(|tools| {
            vec![GoogleTool {
                function_declarations: tools
                    .iter()
                    .map(|t| GoogleFunctionDeclaration {
                        name: t.function.name.clone(),
                        description: t.function.description.clone(),
                        parameters: t.function.parameters.clone(),
                    })
                    .collect(),
            }]
        });

        let tool_config = req.tool_choice.as_ref().map(|tc| {
            let (mode, allowed_names) = match tc {
                ToolChoice::Mode(ToolChoiceMode::None) => ("NONE".to_owned(), None),
                ToolChoice::Mode(ToolChoiceMode::Auto) => ("AUTO".to_owned(), None),
                ToolChoice::Mode(ToolChoiceMode::Required) => ("ANY".to_owned(), None),
                ToolChoice::Function(func) => ("ANY".to_owned(), Some(vec![func.function.name.clone()])),
            };
            GoogleToolConfig { function_calling_config: GoogleFunctionCallingConfig { mode, allowed_function_names: allowed_names } }
        });

        Self { contents, system_instruction, generation_config, tools, tool_config }
    }
}

fn internal_message_to_google(msg: &Message, role: &str) -> GoogleContent {
    let mut parts = Vec::new();

    match &msg.content {
        Content::Text(text) => {
            if !text.is_empty() {
                parts.push(GooglePart::text(text.clone()));
            }
        }
        Content::Parts(content_parts) => {
            for part in content_parts {
                match part {
                    ContentPart::Text { text } => parts.push(GooglePart::text(text.clone())),
                    ContentPart::Image { url, .. } => {
                        if let Some((mime_type, data)) = parse_data_uri(url) {
                            parts.push(GooglePart { inline_data: Some(GoogleInlineData { mime_type, data }), ..GooglePart::default() });
                        }
                    }
                }
            }
        }
    }

    if let Some(tool_calls) = &msg.tool_calls {
        for tc in tool_calls {
            let args = serde_json::from_str(&tc.function.arguments).unwrap_or_else(|_| serde_json::json!({}));
            parts.push(GooglePart {
                function_call: Some(GoogleFunctionCall { name: tc.function.name.clone(), args }),
                ..GooglePart::default()
            });
        }
    }

    if parts.is_empty() {
        parts.push(GooglePart::text(String::new()));
    }

    GoogleContent { role: Some(role.to_owned()), parts }
}

fn parse_data_uri(url: &str) -> Option<(String, String)> {
    let rest = url.strip_prefix("data:")?;
    let (meta, data) = rest.split_once(',')?;
    let mime_type = meta.strip_suffix(";base64")?;
    Some((mime_type.to_owned(), data.to_owned()))
}

// -- Inbound: Google wire response -> internal types --

fn map_finish_reason(s: &str) -> Option<FinishReason> {
    match s {
        "STOP" => Some(FinishReason::Stop),
        "MAX_TOKENS" => Some(FinishReason::Length),
        "SAFETY" | "RECITATION" | "BLOCKLIST" | "PROHIBITED_CONTENT" => Some(FinishReason::ContentFilter),
        _ => None,
    }
}

/// Parses a non-streaming `generateContent` response per §4.4's Google rule. Returns the
/// canonical response plus any `(toolCallId, thoughtSignature)` pairs the caller should
/// `SETEX thought_signature:<id>` with a 1 day TTL.
#[must_use]
pub fn google_response_to_completion(resp: GoogleResponse) -> (CompletionResponse, Vec<(String, String)>) {
    let block_reason = resp.prompt_feedback.as_ref().and_then(|f| f.block_reason.as_ref());

    let mut choices = Vec::new();
    let mut signatures = Vec::new();

    for candidate in &resp.candidates {
        let (message, candidate_signatures, web_search_count) = candidate_to_message(candidate);
        signatures.extend(candidate_signatures);

        let finish_reason = if block_reason.is_some() {
            Some(FinishReason::ContentFilter)
        } else {
            candidate.finish_reason.as_deref().and_then(map_finish_reason)
        };

        choices.push((Choice { index: candidate.index, message, finish_reason }, web_search_count));
    }

    let web_search_count: u32 = choices.iter().map(|(_, count)| count).sum();
    let choices: Vec<Choice> = choices.into_iter().map(|(choice, _)| choice).collect();

    let (prompt_tokens, completion_tokens, reasoning_tokens) = resp.usage_metadata.as_ref().map_or((0, 0, 0), |u| {
        let completion_tokens = if u.candidates_token_count > 0 {
            u.candidates_token_count
        } else {
            estimate_completion_tokens(&choices)
        };
        (u.prompt_token_count, completion_tokens, u.thoughts_token_count)
    });

    let usage = resp.usage_metadata.as_ref().map(|_| Usage {
        prompt_tokens,
        completion_tokens,
        // Deliberately ignores `usage_metadata.total_token_count` (§9 open question (b)).
        total_tokens: prompt_tokens + completion_tokens + reasoning_tokens,
        reasoning_tokens,
        cached_tokens: 0,
    });

    let response = CompletionResponse {
        id: String::new(),
        object: "chat.completion".to_owned(),
        created: 0,
        model: String::new(),
        choices,
        usage,
        web_search_count,
    };

    (response, signatures)
}

fn estimate_completion_tokens(choices: &[Choice]) -> u32 {
    let text: String = choices.iter().filter_map(|c| c.message.content.as_deref()).collect();
    u32::try_from(estimate_tokens(&text)).unwrap_or(u32::MAX)
}

/// Returns the choice message, any `(toolCallId, thoughtSignature)` pairs from its
/// function-call parts, and its web-search grounding count.
fn candidate_to_message(candidate: &GoogleCandidate) -> (ChoiceMessage, Vec<(String, String)>, u32) {
    let mut text = String::new();
    let mut reasoning = String::new();
    let mut images = Vec::new();
    let mut tool_calls = Vec::new();
    let mut signatures = Vec::new();

    for (part_index, part) in candidate.content.parts.iter().enumerate() {
        if let Some(call) = &part.function_call {
            let id = format!("{}_{}_{part_index}", call.name, candidate.index);
            let arguments = serde_json::to_string(&call.args).unwrap_or_else(|_| "{}".to_owned());
            tool_calls.push(build_tool_call(id.clone(), call.name.clone(), arguments));
            if let Some(signature) = &part.thought_signature {
                signatures.push((id, signature.clone()));
            }
            continue;
        }
        if let Some(inline) = &part.inline_data {
            images.push(Image { url: format!("data:{};base64,{}", inline.mime_type, inline.data) });
            continue;
        }
        if let Some(t) = &part.text {
            if part.thought == Some(true) {
                reasoning.push_str(t);
            } else {
                text.push_str(t);
            }
        }
    }

    let annotations = candidate
        .grounding_metadata
        .as_ref()
        .map(|g| {
            g.grounding_chunks
                .iter()
                .filter_map(|c| c.web.as_ref())
                .filter_map(|w| Some(Annotation { annotation_type: "url_citation".to_owned(), url: w.uri.clone()?, title: w.title.clone() }))
                .collect()
        })
        .unwrap_or_default();

    let web_search_count = u32::from(candidate.grounding_metadata.is_some());

    let message = ChoiceMessage {
        role: "assistant".to_owned(),
        content: (!text.is_empty()).then_some(text),
        reasoning: (!reasoning.is_empty()).then_some(reasoning),
        tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
        images,
        annotations,
    };

    (message, signatures, web_search_count)
}

// -- Streaming --

/// Converts one `streamGenerateContent` chunk into canonical stream events per §4.5's
/// Google rule, plus any `thoughtSignature`s to persist. `now_unix` seeds the
/// synthesized tool-call id `<name>_<ts>_<idx>`; impure (wall-clock) by construction, so
/// it's threaded in rather than read here.
#[must_use]
pub fn google_chunk_to_events(chunk: &GoogleStreamChunk, now_unix: u64) -> (Vec<StreamEvent>, Vec<(String, String)>) {
    let mut events = Vec::new();
    let mut signatures = Vec::new();
    let block_reason = chunk.prompt_feedback.as_ref().and_then(|f| f.block_reason.as_ref());

    for candidate in &chunk.candidates {
        for (part_index, part) in candidate.content.parts.iter().enumerate() {
            if let Some(call) = &part.function_call {
                let id = format!("{}_{now_unix}_{part_index}", call.name);
                let arguments = serde_json::to_string(&call.args).unwrap_or_else(|_| "{}".to_owned());
                if let Some(signature) = &part.thought_signature {
                    signatures.push((id.clone(), signature.clone()));
                }
                events.push(StreamEvent::Delta(StreamDelta {
                    index: candidate.index,
                    content: None,
                    reasoning: None,
                    tool_call: Some(StreamToolCall {
                        index: candidate.index,
                        id: Some(id),
                        function: Some(crate::types::StreamFunctionCall { name: Some(call.name.clone()), arguments: Some(arguments) }),
                    }),
                    images: Vec::new(),
                    annotations: Vec::new(),
                    finish_reason: None,
                }));
                continue;
            }
            if let Some(inline) = &part.inline_data {
                events.push(StreamEvent::Delta(StreamDelta {
                    index: candidate.index,
                    content: None,
                    reasoning: None,
                    tool_call: None,
                    images: vec![Image { url: format!("data:{};base64,{}", inline.mime_type, inline.data) }],
                    annotations: Vec::new(),
                    finish_reason: None,
                }));
                continue;
            }
            if let Some(t) = &part.text {
                let (content, reasoning) = if part.thought == Some(true) { (None, Some(t.clone())) } else { (Some(t.clone()), None) };
                events.push(StreamEvent::Delta(StreamDelta {
                    index: candidate.index,
                    content,
                    reasoning,
                    tool_call: None,
                    images: Vec::new(),
                    annotations: Vec::new(),
                    finish_reason: None,
                }));
            }
        }

        let finish_reason =
            if block_reason.is_some() { Some(FinishReason::ContentFilter) } else { candidate.finish_reason.as_deref().and_then(map_finish_reason) };

        let has_content = !candidate.content.parts.is_empty();
        if finish_reason.is_some() || (!has_content && block_reason.is_some()) {
            events.push(StreamEvent::Delta(StreamDelta {
                index: candidate.index,
                content: None,
                reasoning: None,
                tool_call: None,
                images: Vec::new(),
                annotations: Vec::new(),
                finish_reason,
            }));
        }
    }

    if let Some(usage) = &chunk.usage_metadata {
        events.push(StreamEvent::Usage(Usage {
            prompt_tokens: usage.prompt_token_count,
            completion_tokens: usage.candidates_token_count,
            total_tokens: usage.prompt_token_count + usage.candidates_token_count + usage.thoughts_token_count,
            reasoning_tokens: usage.thoughts_token_count,
            cached_tokens: 0,
        }));
    }

    (events, signatures)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::google::{GoogleCandidate, GoogleUsageMetadata};

    fn candidate_with_text(text: &str, thought: bool) -> GoogleCandidate {
        GoogleCandidate {
            content: GoogleContent {
                role: Some("model".to_owned()),
                parts: vec![GooglePart { thought: thought.then_some(true), ..GooglePart::text(text.to_owned()) }],
            },
            finish_reason: Some("STOP".to_owned()),
            index: 0,
            grounding_metadata: None,
        }
    }

    #[test]
    fn thought_part_becomes_reasoning_not_content() {
        let resp = GoogleResponse { candidates: vec![candidate_with_text("because", true)], ..GoogleResponse::default() };
        let (completion, _) = google_response_to_completion(resp);
        let message = &completion.choices[0].message;
        assert_eq!(message.reasoning.as_deref(), Some("because"));
        assert!(message.content.is_none());
    }

    #[test]
    fn plain_text_part_becomes_content() {
        let resp = GoogleResponse { candidates: vec![candidate_with_text("hello", false)], ..GoogleResponse::default() };
        let (completion, _) = google_response_to_completion(resp);
        assert_eq!(completion.choices[0].message.content.as_deref(), Some("hello"));
    }

    #[test]
    fn function_call_id_is_deterministic() {
        let candidate = GoogleCandidate {
            content: GoogleContent {
                role: Some("model".to_owned()),
                parts: vec![GooglePart {
                    function_call: Some(GoogleFunctionCall { name: "lookup".to_owned(), args: serde_json::json!({}) }),
                    ..GooglePart::default()
                }],
            },
            finish_reason: None,
            index: 2,
            grounding_metadata: None,
        };
        let resp = GoogleResponse { candidates: vec![candidate], ..GoogleResponse::default() };
        let (completion, _) = google_response_to_completion(resp);
        assert_eq!(completion.choices[0].message.tool_calls.as_ref().unwrap()[0].id, "lookup_2_0");
    }

    #[test]
    fn block_reason_supersedes_candidate_finish_reason() {
        let mut resp = GoogleResponse { candidates: vec![candidate_with_text("x", false)], ..GoogleResponse::default() };
        resp.prompt_feedback = Some(crate::protocol::google::GooglePromptFeedback { block_reason: Some("SAFETY".to_owned()) });
        let (completion, _) = google_response_to_completion(resp);
        assert_eq!(completion.choices[0].finish_reason, Some(FinishReason::ContentFilter));
    }

    #[test]
    fn total_tokens_ignores_upstream_total_token_count() {
        let resp = GoogleResponse {
            candidates: vec![candidate_with_text("hi", false)],
            usage_metadata: Some(GoogleUsageMetadata { prompt_token_count: 10, candidates_token_count: 5, total_token_count: 999, thoughts_token_count: 2 }),
            prompt_feedback: None,
        };
        let (completion, _) = google_response_to_completion(resp);
        assert_eq!(completion.usage.unwrap().total_tokens, 17);
    }

    #[test]
    fn thought_signature_is_collected_for_caching() {
        let candidate = GoogleCandidate {
            content: GoogleContent {
                role: Some("model".to_owned()),
                parts: vec![GooglePart {
                    function_call: Some(GoogleFunctionCall { name: "lookup".to_owned(), args: serde_json::json!({}) }),
                    thought_signature: Some("sig-123".to_owned()),
                    ..GooglePart::default()
                }],
            },
            finish_reason: None,
            index: 0,
            grounding_metadata: None,
        };
        let resp = GoogleResponse { candidates: vec![candidate], ..GoogleResponse::default() };
        let (_, signatures) = google_response_to_completion(resp);
        assert_eq!(signatures, vec![("lookup_0_0".to_owned(), "sig-123".to_owned())]);
    }
}
