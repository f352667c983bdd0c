//! Pure conversion helpers between internal types and AWS Bedrock's Converse API types
//! (§4.4/§4.5). No hand-rolled wire structs here — `aws-sdk-bedrockruntime`'s own typed
//! `Message`/`ContentBlock`/`ConverseOutput`/`StopReason` are the wire format.
//!
//! Grounded on the teacher's `crates/synapse-llm/src/provider/bedrock.rs` `build_*`/
//! `extract_bedrock_response`/`value_to_document`/`document_to_value` free functions,
//! split out of the provider (which stays IO-only here, matching this crate's
//! protocol/convert/provider layering) and adapted to return `GatewayError` instead of
//! the teacher's `LlmError`, and to the richer canonical `Usage`/`ChoiceMessage` shape.

use std::collections::HashMap;

use aws_sdk_bedrockruntime::types::{
    ContentBlock, ConversationRole, ImageBlock, ImageFormat, ImageSource, InferenceConfiguration,
    Message as BedrockMessage, StopReason, SystemContentBlock, Tool, ToolConfiguration, ToolInputSchema,
    ToolResultBlock, ToolResultContentBlock, ToolSpecification, ToolUseBlock,
};
use aws_smithy_types::{Blob, Document, Number};
use gateway_core::GatewayError;

use crate::types::{build_tool_call, CompletionRequest, Content, ContentPart, FinishReason, Message, Role, ToolCall, Usage};

/// §4.4 Bedrock rule: `stopReason` -> unified finish reason.
#[must_use]
pub fn map_stop_reason(reason: &StopReason) -> FinishReason {
    match reason {
        StopReason::MaxTokens => FinishReason::Length,
        StopReason::ToolUse => FinishReason::ToolCalls,
        StopReason::ContentFiltered => FinishReason::ContentFilter,
        // EndTurn and any future variant default to Stop.
        _ => FinishReason::Stop,
    }
}

/// §4.4 Bedrock rule: `promptTokens = inputTokens + cacheReadInputTokens + cacheWriteInputTokens`,
/// `cachedTokens = cacheReadInputTokens`.
#[must_use]
pub fn usage_from_token_usage(usage: &aws_sdk_bedrockruntime::types::TokenUsage) -> Usage {
    let input_tokens = u32::try_from(usage.input_tokens()).unwrap_or(0);
    let output_tokens = u32::try_from(usage.output_tokens()).unwrap_or(0);
    let cache_read = usage.cache_read_input_tokens().and_then(|n| u32::try_from(n).ok()).unwrap_or(0);
    let cache_write = usage.cache_write_input_tokens().and_then(|n| u32::try_from(n).ok()).unwrap_or(0);

    Usage {
        prompt_tokens: input_tokens + cache_read + cache_write,
        completion_tokens: output_tokens,
        total_tokens: input_tokens + cache_read + cache_write + output_tokens,
        reasoning_tokens: 0,
        cached_tokens: cache_read,
    }
}

/// Splits a request's messages into Bedrock system blocks and Converse messages.
///
/// # Errors
///
/// Returns an error if a tool-result block cannot be built (only possible with an
/// invalid `tool_call_id`).
pub fn build_converse_input(request: &CompletionRequest) -> Result<(Vec<SystemContentBlock>, Vec<BedrockMessage>), GatewayError> {
    let mut system_blocks = Vec::new();
    let mut messages = Vec::new();

    for msg in &request.messages {
        match msg.role {
            Role::System => system_blocks.push(SystemContentBlock::Text(msg.content.as_text())),
            Role::User => {
                if let Ok(bedrock_msg) =
                    BedrockMessage::builder().role(ConversationRole::User).set_content(Some(build_content_blocks(msg))).build()
                {
                    messages.push(bedrock_msg);
                }
            }
            Role::Assistant => {
                if let Ok(bedrock_msg) = BedrockMessage::builder()
                    .role(ConversationRole::Assistant)
                    .set_content(Some(build_content_blocks(msg)))
                    .build()
                {
                    messages.push(bedrock_msg);
                }
            }
            Role::Tool => {
                let tool_call_id = msg.tool_call_id.clone().unwrap_or_default();
                let result_text = msg.content.as_text();
                let tool_result = ContentBlock::ToolResult(
                    ToolResultBlock::builder()
                        .tool_use_id(tool_call_id)
                        .content(ToolResultContentBlock::Text(result_text))
                        .build()
                        .map_err(|e| GatewayError::Internal(anyhow::anyhow!("invalid bedrock tool result: {e}")))?,
                );
                if let Ok(bedrock_msg) = BedrockMessage::builder().role(ConversationRole::User).content(tool_result).build() {
                    messages.push(bedrock_msg);
                }
            }
        }
    }

    Ok((system_blocks, messages))
}

#[must_use]
pub fn build_content_blocks(msg: &Message) -> Vec<ContentBlock> {
    let mut blocks = Vec::new();

    match &msg.content {
        Content::Text(text) => {
            if !text.is_empty() {
                blocks.push(ContentBlock::Text(text.clone()));
            }
        }
        Content::Parts(parts) => {
            for part in parts {
                match part {
                    ContentPart::Text { text } => blocks.push(ContentBlock::Text(text.clone())),
                    ContentPart::Image { url, .. } => {
                        if let Some(block) = image_content_block(url) {
                            blocks.push(block);
                        }
                    }
                }
            }
        }
    }

    if let Some(tool_calls) = &msg.tool_calls {
        for tc in tool_calls {
            let input = serde_json::from_str::<serde_json::Value>(&tc.function.arguments).unwrap_or_else(|_| serde_json::json!({}));
            if let Ok(tool_use) = ToolUseBlock::builder().tool_use_id(&tc.id).name(&tc.function.name).input(value_to_document(&input)).build() {
                blocks.push(ContentBlock::ToolUse(tool_use));
            }
        }
    }

    if blocks.is_empty() {
        blocks.push(ContentBlock::Text(String::new()));
    }

    blocks
}

fn image_content_block(url: &str) -> Option<ContentBlock> {
    let rest = url.strip_prefix("data:")?;
    let (mime_and_encoding, data) = rest.split_once(',')?;
    let format = mime_and_encoding.strip_suffix(";base64").unwrap_or(mime_and_encoding);
    let image_format = match format {
        "image/png" => ImageFormat::Png,
        "image/gif" => ImageFormat::Gif,
        "image/webp" => ImageFormat::Webp,
        _ => ImageFormat::Jpeg,
    };
    let bytes = base64::Engine::decode(&base64::engine::general_purpose::STANDARD, data).ok()?;
    let image_block = ImageBlock::builder().format(image_format).source(ImageSource::Bytes(Blob::new(bytes))).build().ok()?;
    Some(ContentBlock::Image(image_block))
}

#[must_use]
pub fn build_inference_config(request: &CompletionRequest) -> InferenceConfiguration {
    let mut config = InferenceConfiguration::builder();

    if let Some(temp) = request.params.temperature {
        #[allow(clippy::cast_possible_truncation)]
        {
            config = config.temperature(temp as f32);
        }
    }
    if let Some(top_p) = request.params.top_p {
        #[allow(clippy::cast_possible_truncation)]
        {
            config = config.top_p(top_p as f32);
        }
    }
    if let Some(max_tokens) = request.params.max_tokens {
        #[allow(clippy::cast_possible_wrap)]
        let max_tokens_i32 = max_tokens as i32;
        config = config.max_tokens(max_tokens_i32);
    }
    if let Some(stop) = &request.params.stop {
        for seq in stop {
            config = config.stop_sequences(seq.clone());
        }
    }

    config.build()
}

#[must_use]
pub fn build_tool_config(request: &CompletionRequest) -> Option<ToolConfiguration> {
    let tools = request.tools.as_ref()?;

    let tool_specs: Vec<Tool> = tools
        .iter()
        .filter_map(|t| {
            let input_schema = t
                .function
                .parameters
                .as_ref()
                .map_or_else(|| ToolInputSchema::Json(Document::Object(HashMap::new())), |p| ToolInputSchema::Json(value_to_document(p)));

            let mut spec_builder = ToolSpecification::builder().name(&t.function.name).input_schema(input_schema);
            if let Some(desc) = &t.function.description {
                spec_builder = spec_builder.description(desc);
            }

            Some(Tool::ToolSpec(spec_builder.build().ok()?))
        })
        .collect();

    if tool_specs.is_empty() {
        return None;
    }

    let mut tool_config = ToolConfiguration::builder();
    for tool in tool_specs {
        tool_config = tool_config.tools(tool);
    }
    tool_config.build().ok()
}

/// Extracts text content and tool calls from a Converse response message.
#[must_use]
pub fn extract_message_content(msg: &BedrockMessage) -> (Option<String>, Option<Vec<ToolCall>>) {
    let mut text = String::new();
    let mut tool_calls = Vec::new();

    for block in msg.content() {
        match block {
            ContentBlock::Text(t) => text.push_str(t),
            ContentBlock::ToolUse(tu) => {
                let arguments = serde_json::to_string(&document_to_value(tu.input())).unwrap_or_else(|_| "{}".to_owned());
                tool_calls.push(build_tool_call(tu.tool_use_id().to_owned(), tu.name().to_owned(), arguments));
            }
            _ => {}
        }
    }

    ((!text.is_empty()).then_some(text), (!tool_calls.is_empty()).then_some(tool_calls))
}

#[must_use]
pub fn value_to_document(value: &serde_json::Value) -> Document {
    match value {
        serde_json::Value::Null => Document::Null,
        serde_json::Value::Bool(b) => Document::Bool(*b),
        #[allow(clippy::cast_precision_loss)]
        serde_json::Value::Number(n) => n
            .as_i64()
            .map_or_else(|| n.as_f64().map_or(Document::Null, |f| Document::Number(Number::Float(f))), |i| Document::Number(Number::Float(i as f64))),
        serde_json::Value::String(s) => Document::String(s.clone()),
        serde_json::Value::Array(arr) => Document::Array(arr.iter().map(value_to_document).collect()),
        serde_json::Value::Object(map) => {
            let obj: HashMap<String, Document> = map.iter().map(|(k, v)| (k.clone(), value_to_document(v))).collect();
            Document::Object(obj)
        }
    }
}

#[must_use]
pub fn document_to_value(doc: &Document) -> serde_json::Value {
    match doc {
        Document::Object(map) => {
            let obj: serde_json::Map<String, serde_json::Value> = map.iter().map(|(k, v)| (k.clone(), document_to_value(v))).collect();
            serde_json::Value::Object(obj)
        }
        Document::Array(arr) => serde_json::Value::Array(arr.iter().map(document_to_value).collect()),
        Document::Number(n) => {
            let f = n.to_f64_lossy();
            serde_json::Number::from_f64(f).map_or(serde_json::Value::Null, serde_json::Value::Number)
        }
        Document::String(s) => serde_json::Value::String(s.clone()),
        Document::Bool(b) => serde_json::Value::Bool(*b),
        Document::Null => serde_json::Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_reason_mapping_matches_spec() {
        assert_eq!(map_stop_reason(&StopReason::EndTurn), FinishReason::Stop);
        assert_eq!(map_stop_reason(&StopReason::MaxTokens), FinishReason::Length);
        assert_eq!(map_stop_reason(&StopReason::ToolUse), FinishReason::ToolCalls);
        assert_eq!(map_stop_reason(&StopReason::ContentFiltered), FinishReason::ContentFilter);
    }

    #[test]
    fn value_document_roundtrip_preserves_object_shape() {
        let value = serde_json::json!({ "a": 1, "b": "two", "c": [true, null] });
        let doc = value_to_document(&value);
        let back = document_to_value(&doc);
        assert_eq!(back["a"], serde_json::json!(1.0));
        assert_eq!(back["b"], serde_json::json!("two"));
        assert_eq!(back["c"][0], serde_json::json!(true));
    }

    #[test]
    fn empty_message_gets_placeholder_text_block() {
        let msg = Message { role: Role::User, content: Content::Text(String::new()), name: None, tool_calls: None, tool_call_id: None };
        let blocks = build_content_blocks(&msg);
        assert_eq!(blocks.len(), 1);
        assert!(matches!(blocks[0], ContentBlock::Text(ref t) if t.is_empty()));
    }
}
