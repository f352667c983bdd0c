//! Alibaba DashScope and ZAI CogView image-generation adapter (§4.4, §9).
//!
//! Grounded on `provider::openai_compatible`'s request/error-classification shape — both
//! families accept the same request body as the chat-completions adapter, only their
//! response shape differs, so `complete` reuses `OpenAiRequest` and swaps only the
//! response parser. Neither family is documented to stream, so `complete_stream` is
//! unsupported here (§4.5 names no streaming rule for either).

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;
use gateway_core::GatewayError;
use reqwest::Client;

use super::{Provider, ProviderCapabilities};
use crate::convert::image_gen::{dashscope_response_to_completion, zai_cogview_response_to_completion};
use crate::protocol::image_gen::{DashScopeResponse, ZaiCogViewResponse};
use crate::protocol::openai::OpenAiRequest;
use crate::types::{CompletionRequest, CompletionResponse, StreamEvent};

/// Which image-gen response shape `complete` should parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageGenFamily {
    DashScope,
    ZaiCogView,
}

pub struct ImageGenProvider {
    name: String,
    client: Client,
    base_url: String,
    family: ImageGenFamily,
}

impl ImageGenProvider {
    #[must_use]
    pub fn new(name: impl Into<String>, base_url: impl Into<String>, family: ImageGenFamily) -> Self {
        Self { name: name.into(), client: Client::new(), base_url: base_url.into(), family }
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

async fn classify_error_response(response: reqwest::Response) -> GatewayError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    if status.is_server_error() {
        GatewayError::Upstream5xx { status: status.as_u16(), body }
    } else {
        GatewayError::Upstream4xx { status: status.as_u16(), body }
    }
}

#[async_trait]
impl Provider for ImageGenProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities { streaming: false, tool_calling: false }
    }

    async fn complete(&self, request: &CompletionRequest, api_key: Option<&str>) -> Result<CompletionResponse, GatewayError> {
        let wire_request: OpenAiRequest = request.into();

        let mut builder = self.client.post(self.completions_url()).json(&wire_request);
        if let Some(key) = api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(|e| GatewayError::Upstream5xx { status: 0, body: e.to_string() })?;

        if !response.status().is_success() {
            return Err(classify_error_response(response).await);
        }

        let now = std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0);
        let id = format!("{}-{now}", self.name);

        match self.family {
            ImageGenFamily::DashScope => {
                let wire: DashScopeResponse = response
                    .json()
                    .await
                    .map_err(|e| GatewayError::Internal(anyhow::anyhow!("failed to parse upstream response: {e}")))?;
                Ok(dashscope_response_to_completion(wire, id, request.model.clone(), now))
            }
            ImageGenFamily::ZaiCogView => {
                let wire: ZaiCogViewResponse = response
                    .json()
                    .await
                    .map_err(|e| GatewayError::Internal(anyhow::anyhow!("failed to parse upstream response: {e}")))?;
                Ok(zai_cogview_response_to_completion(wire, id, request.model.clone(), now))
            }
        }
    }

    async fn complete_stream(
        &self,
        _request: &CompletionRequest,
        _api_key: Option<&str>,
    ) -> Result<Pin<Box<dyn Stream<Item = Result<StreamEvent, GatewayError>> + Send>>, GatewayError> {
        Err(GatewayError::BadRequest(format!("{} does not support streaming", self.name)))
    }
}
