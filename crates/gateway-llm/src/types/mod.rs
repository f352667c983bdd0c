//! Internal canonical types for LLM request/response representation.
//!
//! Provider-agnostic; every wire format converts to/from these via `From`/`Into`
//! impls in `convert::*`. Grounded on `crates/synapse-llm/src/types/*.rs`, expanded
//! per SPEC_FULL.md §4.4/§4.5/§7 with reasoning content, images, annotations,
//! web-search counts, and a richer token/finish-reason taxonomy.

pub mod message;
pub mod request;
pub mod response;
pub mod stream;
pub mod tool;

pub use message::{Annotation, Content, ContentPart, FunctionCall, Image, Message, Role, ToolCall, ToolResult};
pub use request::{CompletionParams, CompletionRequest};
pub use response::{build_tool_call, Choice, ChoiceMessage, CompletionResponse, FinishReason, Usage};
pub use stream::{StreamDelta, StreamEvent, StreamFunctionCall, StreamToolCall};
pub use tool::{
    FunctionDefinition, ToolChoice, ToolChoiceFunction, ToolChoiceFunctionName, ToolChoiceMode, ToolDefinition,
};
