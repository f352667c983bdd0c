//! Conversion between internal types and the OpenAI Responses API wire format (§4.4,
//! §4.5). No teacher counterpart; modeled in the same pure `From`/free-function shape as
//! `convert::openai`/`convert::google`.

use crate::protocol::openai_responses::{
    ResponsesAnnotation, ResponsesInputContent, ResponsesInputItem, ResponsesOutputContent, ResponsesOutputItem,
    ResponsesReasoningConfig, ResponsesRequest, ResponsesResponse, ResponsesStreamEvent, ResponsesTool,
};
use crate::types::{
    build_tool_call, Annotation, Choice, ChoiceMessage, CompletionRequest, CompletionResponse, Content, ContentPart,
    FinishReason, Message, Role, StreamDelta, StreamEvent, StreamFunctionCall, StreamToolCall, ToolCall, Usage,
};

impl From<&CompletionRequest> for ResponsesRequest {
    fn from(req: &CompletionRequest) -> Self {
        let instructions = req
            .messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_text())
            .collect::<Vec<_>>()
            .join("\n");

        let input = req.messages.iter().filter(|m| m.role != Role::System).map(message_to_input_item).collect();

        Self {
            model: req.model.clone(),
            input,
            instructions: (!instructions.is_empty()).then_some(instructions),
            temperature: req.params.temperature,
            top_p: req.params.top_p,
            max_output_tokens: req.params.max_tokens,
            stream: req.stream.then_some(true),
            tools: req.tools.as_ref().map(|tools| tools.iter().map(|t| ResponsesTool {
                tool_type: "function".to_owned(),
                name: t.function.name.clone(),
                description: t.function.description.clone(),
                parameters: t.function.parameters.clone(),
            }).collect()),
            tool_choice: None,
            reasoning: req.params.reasoning_effort.clone().map(|effort| ResponsesReasoningConfig { effort }),
        }
    }
}

fn message_to_input_item(msg: &Message) -> ResponsesInputItem {
    if msg.role == Role::Tool {
        return ResponsesInputItem::FunctionCallOutput {
            call_id: msg.tool_call_id.clone().unwrap_or_default(),
            output: msg.content.as_text(),
        };
    }

    let role = match msg.role {
        Role::Assistant => "assistant",
        _ => "user",
    };

    let content = match &msg.content {
        Content::Text(text) => vec![ResponsesInputContent::InputText { text: text.clone() }],
        Content::Parts(parts) => parts
            .iter()
            .map(|part| match part {
                ContentPart::Text { text } => ResponsesInputContent::InputText { text: text.clone() },
                ContentPart::Image { url, .. } => ResponsesInputContent::InputImage { image_url: url.clone() },
            })
            .collect(),
    };

    ResponsesInputItem::Message { role: role.to_owned(), content }
}

/// §4.4 Responses family rule: message text from `output[type=message].content[0].text`;
/// reasoning from `output[type=reasoning].summary[0].text`; tool calls from
/// `output[type=function_call]`; `webSearchCount = count(output[type=web_search_call])`.
#[must_use]
pub fn responses_to_completion(resp: ResponsesResponse) -> CompletionResponse {
    let mut content: Option<String> = None;
    let mut reasoning: Option<String> = None;
    let mut tool_calls: Vec<ToolCall> = Vec::new();
    let mut annotations: Vec<Annotation> = Vec::new();
    let mut web_search_count = 0u32;

    for item in &resp.output {
        match item {
            ResponsesOutputItem::Message { content: parts, .. } => {
                if let Some(ResponsesOutputContent::OutputText { text, annotations: anns }) = parts.first() {
                    content = Some(text.clone());
                    annotations.extend(anns.iter().filter_map(annotation_to_canonical));
                }
            }
            ResponsesOutputItem::Reasoning { summary } => {
                if let Some(first) = summary.first() {
                    reasoning = Some(first.text.clone());
                }
            }
            ResponsesOutputItem::FunctionCall { id, call_id, name, arguments } => {
                let tool_call_id = call_id.clone().unwrap_or_else(|| id.clone());
                tool_calls.push(build_tool_call(tool_call_id, name.clone(), arguments.clone()));
            }
            ResponsesOutputItem::WebSearchCall { .. } => web_search_count += 1,
            ResponsesOutputItem::Other => {}
        }
    }

    let has_tool_calls = !tool_calls.is_empty();
    let finish_reason = match resp.status.as_str() {
        "completed" if has_tool_calls => Some(FinishReason::ToolCalls),
        "completed" => Some(FinishReason::Stop),
        "incomplete" => Some(FinishReason::Incomplete),
        "failed" | "cancelled" => Some(FinishReason::ContentFilter),
        _ => None,
    };

    let usage = resp.usage.as_ref().map(|u| Usage {
        prompt_tokens: u.input_tokens,
        completion_tokens: u.output_tokens,
        total_tokens: u.input_tokens + u.output_tokens,
        reasoning_tokens: u.output_tokens_details.as_ref().map(|d| d.reasoning_tokens).unwrap_or_default(),
        cached_tokens: u.input_tokens_details.as_ref().map(|d| d.cached_tokens).unwrap_or_default(),
    });

    CompletionResponse {
        id: resp.id,
        object: "chat.completion".to_owned(),
        created: resp.created_at,
        model: resp.model,
        choices: vec![Choice {
            index: 0,
            message: ChoiceMessage {
                role: "assistant".to_owned(),
                content,
                reasoning,
                tool_calls: has_tool_calls.then_some(tool_calls),
                images: Vec::new(),
                annotations,
            },
            finish_reason,
        }],
        usage,
        web_search_count,
    }
}

fn annotation_to_canonical(annotation: &ResponsesAnnotation) -> Option<Annotation> {
    match annotation {
        ResponsesAnnotation::UrlCitation { url, title } => {
            Some(Annotation { annotation_type: "url_citation".to_owned(), url: url.clone(), title: title.clone() })
        }
        ResponsesAnnotation::Other => None,
    }
}

/// §4.5 Responses family rule: maps one SSE event to zero or more canonical stream
/// events. `response.function_call_arguments.done` carries no information beyond what
/// its preceding `.delta` events already accumulated, so it is not re-emitted.
/// `response.web_search_call.*` has no canonical per-delta counterpart (only the final
/// non-streaming response carries `webSearchCount`), so those events are dropped here.
#[must_use]
pub fn responses_event_to_canonical(event: &ResponsesStreamEvent) -> Vec<StreamEvent> {
    match event {
        ResponsesStreamEvent::OutputItemAdded { output_index, item: ResponsesOutputItem::FunctionCall { id, call_id, name, .. } } => {
            let tool_call_id = call_id.clone().unwrap_or_else(|| id.clone());
            vec![StreamEvent::Delta(StreamDelta {
                index: *output_index,
                content: None,
                reasoning: None,
                tool_call: Some(StreamToolCall {
                    index: *output_index,
                    id: Some(tool_call_id),
                    function: Some(StreamFunctionCall { name: Some(name.clone()), arguments: Some(String::new()) }),
                }),
                images: Vec::new(),
                annotations: Vec::new(),
                finish_reason: None,
            })]
        }
        ResponsesStreamEvent::OutputTextDelta { output_index, delta } => vec![StreamEvent::Delta(StreamDelta {
            index: *output_index,
            content: Some(delta.clone()),
            reasoning: None,
            tool_call: None,
            images: Vec::new(),
            annotations: Vec::new(),
            finish_reason: None,
        })],
        ResponsesStreamEvent::OutputTextAnnotationAdded { output_index, annotation } => {
            let Some(annotation) = annotation_to_canonical(annotation) else { return Vec::new() };
            vec![StreamEvent::Delta(StreamDelta {
                index: *output_index,
                content: None,
                reasoning: None,
                tool_call: None,
                images: Vec::new(),
                annotations: vec![annotation],
                finish_reason: None,
            })]
        }
        ResponsesStreamEvent::ReasoningSummaryTextDelta { output_index, delta } => vec![StreamEvent::Delta(StreamDelta {
            index: *output_index,
            content: None,
            reasoning: Some(delta.clone()),
            tool_call: None,
            images: Vec::new(),
            annotations: Vec::new(),
            finish_reason: None,
        })],
        ResponsesStreamEvent::FunctionCallArgumentsDelta { output_index, delta } => vec![StreamEvent::Delta(StreamDelta {
            index: *output_index,
            content: None,
            reasoning: None,
            tool_call: Some(StreamToolCall {
                index: *output_index,
                id: None,
                function: Some(StreamFunctionCall { name: None, arguments: Some(delta.clone()) }),
            }),
            images: Vec::new(),
            annotations: Vec::new(),
            finish_reason: None,
        })],
        ResponsesStreamEvent::Completed { response } | ResponsesStreamEvent::Incomplete { response } => {
            let completion = responses_to_completion(response.clone());
            let finish_reason = completion.choices.first().and_then(|c| c.finish_reason.clone());
            let mut events = vec![StreamEvent::Delta(StreamDelta {
                index: 0,
                content: None,
                reasoning: None,
                tool_call: None,
                images: Vec::new(),
                annotations: Vec::new(),
                finish_reason,
            })];
            if let Some(usage) = completion.usage {
                events.push(StreamEvent::Usage(usage));
            }
            events.push(StreamEvent::Done);
            events
        }
        ResponsesStreamEvent::Created
        | ResponsesStreamEvent::FunctionCallArgumentsDone { .. }
        | ResponsesStreamEvent::WebSearchCallInProgress { .. }
        | ResponsesStreamEvent::WebSearchCallCompleted { .. }
        | ResponsesStreamEvent::OutputItemAdded { .. }
        | ResponsesStreamEvent::Other => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::openai_responses::{ResponsesInputTokensDetails, ResponsesOutputTokensDetails, ResponsesUsage};

    fn base_response(status: &str, output: Vec<ResponsesOutputItem>) -> ResponsesResponse {
        ResponsesResponse {
            id: "resp_1".to_owned(),
            object: "response".to_owned(),
            created_at: 100,
            model: "gpt-test".to_owned(),
            status: status.to_owned(),
            output,
            usage: Some(ResponsesUsage {
                input_tokens: 10,
                output_tokens: 5,
                input_tokens_details: Some(ResponsesInputTokensDetails { cached_tokens: 2 }),
                output_tokens_details: Some(ResponsesOutputTokensDetails { reasoning_tokens: 3 }),
            }),
        }
    }

    #[test]
    fn message_text_becomes_content() {
        let resp = base_response(
            "completed",
            vec![ResponsesOutputItem::Message {
                id: "msg_1".to_owned(),
                role: "assistant".to_owned(),
                content: vec![ResponsesOutputContent::OutputText { text: "hello".to_owned(), annotations: Vec::new() }],
            }],
        );
        let completion = responses_to_completion(resp);
        assert_eq!(completion.choices[0].message.content.as_deref(), Some("hello"));
        assert_eq!(completion.choices[0].finish_reason, Some(FinishReason::Stop));
    }

    #[test]
    fn reasoning_summary_becomes_reasoning() {
        let resp = base_response(
            "completed",
            vec![ResponsesOutputItem::Reasoning { summary: vec![crate::protocol::openai_responses::ResponsesSummaryText { text: "thinking".to_owned() }] }],
        );
        let completion = responses_to_completion(resp);
        assert_eq!(completion.choices[0].message.reasoning.as_deref(), Some("thinking"));
    }

    #[test]
    fn function_call_with_tool_calls_sets_finish_reason() {
        let resp = base_response(
            "completed",
            vec![ResponsesOutputItem::FunctionCall {
                id: "fc_1".to_owned(),
                call_id: Some("call_1".to_owned()),
                name: "lookup".to_owned(),
                arguments: "{}".to_owned(),
            }],
        );
        let completion = responses_to_completion(resp);
        assert_eq!(completion.choices[0].finish_reason, Some(FinishReason::ToolCalls));
        assert_eq!(completion.choices[0].message.tool_calls.as_ref().unwrap()[0].id, "call_1");
    }

    #[test]
    fn incomplete_status_maps_to_incomplete_finish_reason() {
        let resp = base_response("incomplete", Vec::new());
        let completion = responses_to_completion(resp);
        assert_eq!(completion.choices[0].finish_reason, Some(FinishReason::Incomplete));
    }

    #[test]
    fn web_search_call_items_are_counted() {
        let resp = base_response(
            "completed",
            vec![
                ResponsesOutputItem::WebSearchCall { id: "ws_1".to_owned(), status: Some("completed".to_owned()) },
                ResponsesOutputItem::WebSearchCall { id: "ws_2".to_owned(), status: Some("completed".to_owned()) },
            ],
        );
        let completion = responses_to_completion(resp);
        assert_eq!(completion.web_search_count, 2);
    }

    #[test]
    fn function_call_arguments_done_emits_no_event() {
        let event = ResponsesStreamEvent::FunctionCallArgumentsDone { output_index: 0, arguments: "{}".to_owned() };
        assert!(responses_event_to_canonical(&event).is_empty());
    }

    #[test]
    fn output_text_delta_becomes_content_delta() {
        let event = ResponsesStreamEvent::OutputTextDelta { output_index: 0, delta: "hi".to_owned() };
        let events = responses_event_to_canonical(&event);
        assert_eq!(events.len(), 1);
        match &events[0] {
            StreamEvent::Delta(d) => assert_eq!(d.content.as_deref(), Some("hi")),
            _ => panic!("expected delta"),
        }
    }
}
