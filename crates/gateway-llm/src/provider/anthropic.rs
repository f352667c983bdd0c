//! Anthropic Messages API adapter.

use std::pin::Pin;

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures_util::{Stream, StreamExt};
use gateway_core::GatewayError;
use reqwest::Client;

use super::{Provider, ProviderCapabilities};
use crate::convert::anthropic::AnthropicStreamState;
use crate::protocol::anthropic::{AnthropicRequest, AnthropicResponse, AnthropicStreamEvent};
use crate::types::{CompletionRequest, CompletionResponse, StreamEvent};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";

pub struct AnthropicProvider {
    client: Client,
    base_url: String,
}

impl AnthropicProvider {
    #[must_use]
    pub fn new(base_url: Option<String>) -> Self {
        Self { client: Client::new(), base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_owned()) }
    }

    fn messages_url(&self) -> String {
        format!("{}/messages", self.base_url.trim_end_matches('/'))
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
impl Provider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities { streaming: true, tool_calling: true }
    }

    async fn complete(&self, request: &CompletionRequest, api_key: Option<&str>) -> Result<CompletionResponse, GatewayError> {
        let wire_request: AnthropicRequest = request.into();

        let mut builder = self.client.post(self.messages_url()).header("anthropic-version", ANTHROPIC_VERSION).json(&wire_request);
        if let Some(key) = api_key {
            builder = builder.header("x-api-key", key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| GatewayError::Upstream5xx { status: 0, body: e.to_string() })?;

        if !response.status().is_success() {
            return Err(classify_error_response(response).await);
        }

        let wire_response: AnthropicResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::Internal(anyhow::anyhow!("failed to parse upstream response: {e}")))?;

        Ok(wire_response.into())
    }

    async fn complete_stream(
        &self,
        request: &CompletionRequest,
        api_key: Option<&str>,
    ) -> Result<Pin<Box<dyn Stream<Item = Result<StreamEvent, GatewayError>> + Send>>, GatewayError> {
        let mut wire_request: AnthropicRequest = request.into();
        wire_request.stream = Some(true);

        let mut builder = self.client.post(self.messages_url()).header("anthropic-version", ANTHROPIC_VERSION).json(&wire_request);
        if let Some(key) = api_key {
            builder = builder.header("x-api-key", key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| GatewayError::Upstream5xx { status: 0, body: e.to_string() })?;

        if !response.status().is_success() {
            return Err(classify_error_response(response).await);
        }

        let event_stream = response.bytes_stream().eventsource();
        let mut state = AnthropicStreamState::new();
        let mut json_buffer = String::new();

        let mapped = event_stream
            .map(move |result| match result {
                Ok(event) => {
                    let Some(candidate) = crate::json_assembler::try_assemble(&mut json_buffer, event.data.trim()) else {
                        return vec![];
                    };
                    match serde_json::from_str::<AnthropicStreamEvent>(&candidate) {
                        Ok(parsed) => state.handle(parsed).into_iter().map(Ok).collect(),
                        Err(e) => {
                            tracing::debug!(error = %e, "skipping unparseable Anthropic SSE event");
                            vec![]
                        }
                    }
                }
                Err(e) => vec![Err(GatewayError::Upstream5xx { status: 0, body: e.to_string() })],
            })
            .flat_map(futures_util::stream::iter);

        Ok(Box::pin(mapped))
    }
}
