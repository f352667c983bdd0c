use gateway_core::UnifiedFinishReason;
use serde::{Deserialize, Serialize};

use super::message::{Annotation, FunctionCall, Image, ToolCall};

/// Reason the model stopped generating, in the provider-facing OpenAI-compatible shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ToolCalls,
    ContentFilter,
    /// OpenAI Responses `status=incomplete` (§4.4, §9 open question (a)) — preserved distinctly,
    /// never remapped to `Stop`.
    Incomplete,
}

impl FinishReason {
    /// Map to the log record's `unifiedFinishReason` taxonomy (§7, GLOSSARY).
    #[must_use]
    pub const fn to_unified(&self) -> UnifiedFinishReason {
        match self {
            Self::Stop => UnifiedFinishReason::Completed,
            Self::Length => UnifiedFinishReason::LengthLimit,
            Self::ToolCalls => UnifiedFinishReason::ToolCalls,
            Self::ContentFilter => UnifiedFinishReason::ContentFilter,
            Self::Incomplete => UnifiedFinishReason::Incomplete,
        }
    }
}

/// Token usage statistics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
    /// Billed as output per §4.7 step 5 (`totalOutputTokens = completionTokens + reasoningTokens`).
    #[serde(default)]
    pub reasoning_tokens: u32,
    /// Subset of `prompt_tokens` served from cache (§4.4/§4.7).
    #[serde(default)]
    pub cached_tokens: u32,
}

/// A single completion choice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Choice {
    pub index: u32,
    pub message: ChoiceMessage,
    pub finish_reason: Option<FinishReason>,
}

/// Message content within a response choice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChoiceMessage {
    pub role: String,
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<Image>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub annotations: Vec<Annotation>,
}

impl ChoiceMessage {
    #[must_use]
    pub fn text(content: String) -> Self {
        Self {
            role: "assistant".to_owned(),
            content: Some(content),
            reasoning: None,
            tool_calls: None,
            images: Vec::new(),
            annotations: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_tool_calls(tool_calls: Vec<ToolCall>) -> Self {
        Self {
            role: "assistant".to_owned(),
            content: None,
            reasoning: None,
            tool_calls: Some(tool_calls),
            images: Vec::new(),
            annotations: Vec::new(),
        }
    }
}

/// Internal canonical completion response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResponse {
    pub id: String,
    pub object: String,
    pub created: u64,
    pub model: String,
    pub choices: Vec<Choice>,
    pub usage: Option<Usage>,
    /// Count of upstream web-search tool invocations (§4.4, §4.7 `webSearchCost`).
    #[serde(default)]
    pub web_search_count: u32,
}

#[must_use]
pub fn build_tool_call(id: String, name: String, arguments: String) -> ToolCall {
    ToolCall {
        id,
        function: FunctionCall { name, arguments },
    }
}
