//! OpenAI Responses API (`/v1/responses`) adapter.
//!
//! Grounded on `provider::openai_compatible`'s `classify_error_response`/
//! `eventsource_stream::Eventsource` shape; the request/response shaping itself has no
//! teacher counterpart and lives in `convert::openai_responses` (§4.4/§4.5).

use std::pin::Pin;

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures_util::{Stream, StreamExt};
use gateway_core::GatewayError;
use reqwest::Client;

use super::{Provider, ProviderCapabilities};
use crate::convert::openai_responses::{responses_event_to_canonical, responses_to_completion};
use crate::protocol::openai_responses::{ResponsesRequest, ResponsesResponse, ResponsesStreamEvent};
use crate::types::{CompletionRequest, CompletionResponse, StreamEvent};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

pub struct OpenAiResponsesProvider {
    client: Client,
    base_url: String,
}

impl OpenAiResponsesProvider {
    #[must_use]
    pub fn new(base_url: Option<String>) -> Self {
        Self { client: Client::new(), base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_owned()) }
    }

    fn responses_url(&self) -> String {
        format!("{}/responses", self.base_url.trim_end_matches('/'))
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
impl Provider for OpenAiResponsesProvider {
    fn name(&self) -> &str {
        "openai_responses"
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities { streaming: true, tool_calling: true }
    }

    async fn complete(&self, request: &CompletionRequest, api_key: Option<&str>) -> Result<CompletionResponse, GatewayError> {
        let wire_request: ResponsesRequest = request.into();

        let mut builder = self.client.post(self.responses_url()).json(&wire_request);
        if let Some(key) = api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(|e| GatewayError::Upstream5xx { status: 0, body: e.to_string() })?;

        if !response.status().is_success() {
            return Err(classify_error_response(response).await);
        }

        let wire_response: ResponsesResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::Internal(anyhow::anyhow!("failed to parse upstream response: {e}")))?;

        Ok(responses_to_completion(wire_response))
    }

    async fn complete_stream(
        &self,
        request: &CompletionRequest,
        api_key: Option<&str>,
    ) -> Result<Pin<Box<dyn Stream<Item = Result<StreamEvent, GatewayError>> + Send>>, GatewayError> {
        let mut wire_request: ResponsesRequest = request.into();
        wire_request.stream = Some(true);

        let mut builder = self.client.post(self.responses_url()).json(&wire_request);
        if let Some(key) = api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(|e| GatewayError::Upstream5xx { status: 0, body: e.to_string() })?;

        if !response.status().is_success() {
            return Err(classify_error_response(response).await);
        }

        let event_stream = response.bytes_stream().eventsource();
        let mut json_buffer = String::new();

        let mapped = event_stream
            .map(move |result| match result {
                Ok(event) => {
                    let Some(candidate) = crate::json_assembler::try_assemble(&mut json_buffer, event.data.trim()) else {
                        return vec![];
                    };
                    match serde_json::from_str::<ResponsesStreamEvent>(&candidate) {
                        Ok(chunk) => responses_event_to_canonical(&chunk).into_iter().map(Ok).collect(),
                        Err(e) => {
                            tracing::debug!(error = %e, "skipping unparseable Responses SSE event");
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
