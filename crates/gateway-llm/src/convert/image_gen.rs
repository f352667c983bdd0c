//! Conversion for image-generation response shapes (§4.4): Alibaba DashScope and ZAI
//! CogView. Both report no token usage and a synthetic placeholder content string.

use crate::protocol::image_gen::{DashScopeResponse, ZaiCogViewResponse};
use crate::types::{Choice, ChoiceMessage, CompletionResponse, FinishReason, Image, Usage};

const PLACEHOLDER_CONTENT: &str = "Generated image";

/// §4.4 DashScope rule: `output.choices[0].message.content` is an array; items with
/// `.image` become images; content is a fixed placeholder; finish is always `stop`; all
/// token counts are zero.
#[must_use]
pub fn dashscope_response_to_completion(resp: DashScopeResponse, id: String, model: String, created: u64) -> CompletionResponse {
    let images: Vec<Image> = resp
        .output
        .choices
        .first()
        .map(|choice| choice.message.content.iter().filter_map(|item| item.image.clone()).map(|url| Image { url }).collect())
        .unwrap_or_default();

    CompletionResponse {
        id,
        object: "chat.completion".to_owned(),
        created,
        model,
        choices: vec![Choice {
            index: 0,
            message: ChoiceMessage {
                role: "assistant".to_owned(),
                content: Some(PLACEHOLDER_CONTENT.to_owned()),
                reasoning: None,
                tool_calls: None,
                images,
                annotations: Vec::new(),
            },
            finish_reason: Some(FinishReason::Stop),
        }],
        usage: Some(Usage::default()),
        web_search_count: 0,
    }
}

/// §4.4 ZAI CogView rule: top-level `data[]` with `.url` become images; content is a
/// fixed placeholder; all token counts are zero.
#[must_use]
pub fn zai_cogview_response_to_completion(resp: ZaiCogViewResponse, id: String, model: String, created: u64) -> CompletionResponse {
    let images: Vec<Image> = resp.data.into_iter().map(|item| Image { url: item.url }).collect();

    CompletionResponse {
        id,
        object: "chat.completion".to_owned(),
        created,
        model,
        choices: vec![Choice {
            index: 0,
            message: ChoiceMessage {
                role: "assistant".to_owned(),
                content: Some(PLACEHOLDER_CONTENT.to_owned()),
                reasoning: None,
                tool_calls: None,
                images,
                annotations: Vec::new(),
            },
            finish_reason: Some(FinishReason::Stop),
        }],
        usage: Some(Usage::default()),
        web_search_count: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::image_gen::{DashScopeChoice, DashScopeContentItem, DashScopeMessage, DashScopeOutput, ZaiImageItem};

    #[test]
    fn dashscope_images_are_extracted_with_placeholder_content() {
        let resp = DashScopeResponse {
            output: DashScopeOutput {
                choices: vec![DashScopeChoice {
                    message: DashScopeMessage {
                        content: vec![
                            DashScopeContentItem { image: Some("https://example.com/a.png".to_owned()) },
                            DashScopeContentItem { image: None },
                        ],
                    },
                }],
            },
        };

        let completion = dashscope_response_to_completion(resp, "id".to_owned(), "model".to_owned(), 0);
        assert_eq!(completion.choices[0].message.content.as_deref(), Some(PLACEHOLDER_CONTENT));
        assert_eq!(completion.choices[0].message.images.len(), 1);
        assert_eq!(completion.choices[0].finish_reason, Some(FinishReason::Stop));
        assert_eq!(completion.usage.as_ref().unwrap().total_tokens, 0);
    }

    #[test]
    fn zai_cogview_images_are_extracted() {
        let resp = ZaiCogViewResponse { data: vec![ZaiImageItem { url: "https://example.com/b.png".to_owned() }] };
        let completion = zai_cogview_response_to_completion(resp, "id".to_owned(), "model".to_owned(), 0);
        assert_eq!(completion.choices[0].message.images[0].url, "https://example.com/b.png");
    }
}
