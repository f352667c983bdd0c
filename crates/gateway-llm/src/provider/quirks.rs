//! Per-provider post-processing for the generic OpenAI-compatible adapter (§9): small
//! deviations a handful of providers make from the plain chat-completions shape, applied
//! after the wire response has already been parsed into both its raw and canonical form.

use crate::protocol::openai::OpenAiResponse;
use crate::types::{Annotation, CompletionResponse};

/// Invoked after wire-response parsing with both the raw wire response (for fields the
/// canonical conversion doesn't carry, like zai's `message.web_search`) and the canonical
/// response to adjust in place.
pub trait ResponseQuirk: Send + Sync {
    fn apply(&self, wire: &OpenAiResponse, response: &mut CompletionResponse);
}

/// No-op quirk for providers that need no post-processing.
pub struct NoQuirk;

impl ResponseQuirk for NoQuirk {
    fn apply(&self, _wire: &OpenAiResponse, _response: &mut CompletionResponse) {}
}

/// zai emits inline web-search results as `message.web_search[*]` instead of the
/// `annotations` field other providers use; fold them in and count them (§9/§4.4).
pub struct ZaiQuirk;

impl ResponseQuirk for ZaiQuirk {
    fn apply(&self, wire: &OpenAiResponse, response: &mut CompletionResponse) {
        for (wire_choice, choice) in wire.choices.iter().zip(response.choices.iter_mut()) {
            let Some(items) = &wire_choice.message.web_search else { continue };
            response.web_search_count += u32::try_from(items.len()).unwrap_or(0);
            choice.message.annotations.extend(
                items.iter().map(|item| Annotation { annotation_type: "url_citation".to_owned(), url: item.url.clone(), title: item.title.clone() }),
            );
        }
    }
}

/// Mistral and Novita occasionally wrap their reply in a ```json fenced code block
/// instead of plain text; extract the JSON and re-serialize it so `content` is the
/// parsed value rather than the raw fence (§9/§4.4).
pub struct FencedJsonContentQuirk;

impl ResponseQuirk for FencedJsonContentQuirk {
    fn apply(&self, _wire: &OpenAiResponse, response: &mut CompletionResponse) {
        for choice in &mut response.choices {
            if let Some(content) = &choice.message.content {
                if let Some(extracted) = extract_fenced_json(content) {
                    choice.message.content = Some(extracted);
                }
            }
        }
    }
}

fn extract_fenced_json(content: &str) -> Option<String> {
    let trimmed = content.trim();
    let inner = trimmed.strip_prefix("```json").or_else(|| trimmed.strip_prefix("```"))?;
    let inner = inner.strip_suffix("```")?.trim();
    let value: serde_json::Value = serde_json::from_str(inner).ok()?;
    serde_json::to_string(&value).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::openai::{OpenAiChoice, OpenAiChoiceMessage, OpenAiWebSearchItem};
    use crate::types::{Choice, ChoiceMessage, CompletionResponse};

    fn empty_wire() -> OpenAiResponse {
        OpenAiResponse { id: "id".to_owned(), object: "chat.completion".to_owned(), created: 0, model: "m".to_owned(), choices: Vec::new(), usage: None }
    }

    fn choice_with_content(content: &str) -> Choice {
        Choice {
            index: 0,
            message: ChoiceMessage {
                role: "assistant".to_owned(),
                content: Some(content.to_owned()),
                reasoning: None,
                tool_calls: None,
                images: Vec::new(),
                annotations: Vec::new(),
            },
            finish_reason: None,
        }
    }

    #[test]
    fn fenced_json_quirk_extracts_and_reserializes() {
        let mut response = CompletionResponse {
            id: "id".to_owned(),
            object: "chat.completion".to_owned(),
            created: 0,
            model: "m".to_owned(),
            choices: vec![choice_with_content("```json\n{\"b\": 2, \"a\": 1}\n```")],
            usage: None,
            web_search_count: 0,
        };

        FencedJsonContentQuirk.apply(&empty_wire(), &mut response);

        let content = response.choices[0].message.content.as_deref().unwrap();
        assert!(!content.starts_with("```"));
        let parsed: serde_json::Value = serde_json::from_str(content).unwrap();
        assert_eq!(parsed["a"], serde_json::json!(1));
    }

    #[test]
    fn fenced_json_quirk_leaves_plain_content_alone() {
        let mut response = CompletionResponse {
            id: "id".to_owned(),
            object: "chat.completion".to_owned(),
            created: 0,
            model: "m".to_owned(),
            choices: vec![choice_with_content("just plain text")],
            usage: None,
            web_search_count: 0,
        };

        FencedJsonContentQuirk.apply(&empty_wire(), &mut response);

        assert_eq!(response.choices[0].message.content.as_deref(), Some("just plain text"));
    }

    #[test]
    fn zai_quirk_pulls_web_search_into_annotations() {
        let wire = OpenAiResponse {
            id: "id".to_owned(),
            object: "chat.completion".to_owned(),
            created: 0,
            model: "m".to_owned(),
            choices: vec![OpenAiChoice {
                index: 0,
                message: OpenAiChoiceMessage {
                    role: "assistant".to_owned(),
                    content: Some("answer".to_owned()),
                    reasoning: None,
                    reasoning_content: None,
                    tool_calls: None,
                    web_search: Some(vec![OpenAiWebSearchItem { url: "https://example.com".to_owned(), title: Some("Example".to_owned()) }]),
                },
                finish_reason: None,
            }],
            usage: None,
        };

        let mut response = CompletionResponse {
            id: "id".to_owned(),
            object: "chat.completion".to_owned(),
            created: 0,
            model: "m".to_owned(),
            choices: vec![choice_with_content("answer")],
            usage: None,
            web_search_count: 0,
        };

        ZaiQuirk.apply(&wire, &mut response);

        assert_eq!(response.web_search_count, 1);
        assert_eq!(response.choices[0].message.annotations.len(), 1);
        assert_eq!(response.choices[0].message.annotations[0].url, "https://example.com");
    }
}
