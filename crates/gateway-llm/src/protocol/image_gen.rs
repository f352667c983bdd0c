//! Image-generation response shapes that don't fit the chat-completions `content` string
//! (§4.4): Alibaba DashScope and ZAI CogView. No teacher counterpart; request bodies
//! reuse `protocol::openai::OpenAiRequest` since both families accept the same
//! `model`/`messages` shape for image-gen prompts, only their response differs.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashScopeResponse {
    pub output: DashScopeOutput,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashScopeOutput {
    #[serde(default)]
    pub choices: Vec<DashScopeChoice>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashScopeChoice {
    pub message: DashScopeMessage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashScopeMessage {
    #[serde(default)]
    pub content: Vec<DashScopeContentItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashScopeContentItem {
    #[serde(default)]
    pub image: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZaiCogViewResponse {
    #[serde(default)]
    pub data: Vec<ZaiImageItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZaiImageItem {
    pub url: String,
}
