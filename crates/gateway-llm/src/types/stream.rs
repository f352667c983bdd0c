use serde::{Deserialize, Serialize};

use super::message::{Annotation, FunctionCall, Image};
use super::response::{FinishReason, Usage};

/// Server-sent event during streaming.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StreamEvent {
    Delta(StreamDelta),
    Usage(Usage),
    Done,
}

/// Incremental update within a streaming response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamDelta {
    pub index: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call: Option<StreamToolCall>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<Image>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub annotations: Vec<Annotation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,
}

/// Partial tool call data within a stream delta.
///
/// The opening chunk for a given `index` MUST carry `id`/`function.name`; every
/// follow-up delta for that index MUST NOT (§4.5, §9) — consumers rely on this to
/// distinguish "open" from "append" without inspecting more than one field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamToolCall {
    pub index: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<StreamFunctionCall>,
}

/// Partial function call data within a streaming tool call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamFunctionCall {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,
}

impl StreamFunctionCall {
    #[must_use]
    pub fn into_function_call(self) -> Option<FunctionCall> {
        match (self.name, self.arguments) {
            (Some(name), Some(arguments)) => Some(FunctionCall { name, arguments }),
            _ => None,
        }
    }
}
