//! Generic OpenAI-compatible adapter, shared by every provider in §9 that exposes a
//! `/chat/completions`-shaped API (openai, azure, groq, mistral, novita, deepseek,
//! together.ai, fireworks, perplexity, xai, cerebras, moonshot, zai, nebius, nvidia, …).
//!
//! Grounded on `crates/synapse-llm/src/provider/openai.rs`; config-driven header rules
//! are dropped in favor of a single bearer API key, matching SPEC_FULL.md §3/§6's
//! simpler per-provider `baseUrl` + key model.

use std::pin::Pin;

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures_util::{Stream, StreamExt};
use gateway_core::GatewayError;
use reqwest::Client;

use super::quirks::{NoQuirk, ResponseQuirk};
use super::{Provider, ProviderCapabilities};
use crate::convert::openai::openai_chunk_to_events;
use crate::protocol::openai::{OpenAiRequest, OpenAiResponse, OpenAiStreamChunk};
use crate::types::{CompletionRequest, CompletionResponse, StreamEvent};

pub struct OpenAiCompatibleProvider {
    name: String,
    client: Client,
    base_url: String,
    send_stream_options: bool,
    quirk: Box<dyn ResponseQuirk>,
}

impl OpenAiCompatibleProvider {
    #[must_use]
    pub fn new(name: impl Into<String>, base_url: impl Into<String>, send_stream_options: bool) -> Self {
        Self {
            name: name.into(),
            client: Client::new(),
            base_url: base_url.into(),
            send_stream_options,
            quirk: Box::new(NoQuirk),
        }
    }

    #[must_use]
    pub fn with_quirk(mut self, quirk: Box<dyn ResponseQuirk>) -> Self {
        self.quirk = quirk;
        self
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
impl Provider for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities { streaming: true, tool_calling: true }
    }

    async fn complete(&self, request: &CompletionRequest, api_key: Option<&str>) -> Result<CompletionResponse, GatewayError> {
        let wire_request: OpenAiRequest = request.into();

        let mut builder = self.client.post(self.completions_url()).json(&wire_request);
        if let Some(key) = api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| GatewayError::Upstream5xx { status: 0, body: e.to_string() })?;

        if !response.status().is_success() {
            return Err(classify_error_response(response).await);
        }

        let wire_response: OpenAiResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::Internal(anyhow::anyhow!("failed to parse upstream response: {e}")))?;

        let mut canonical: CompletionResponse = wire_response.clone().into();
        self.quirk.apply(&wire_response, &mut canonical);
        Ok(canonical)
    }

    async fn complete_stream(
        &self,
        request: &CompletionRequest,
        api_key: Option<&str>,
    ) -> Result<Pin<Box<dyn Stream<Item = Result<StreamEvent, GatewayError>> + Send>>, GatewayError> {
        let mut wire_request: OpenAiRequest = request.into();
        wire_request.stream = Some(true);
        if !self.send_stream_options {
            wire_request.stream_options = None;
        }

        let mut builder = self.client.post(self.completions_url()).json(&wire_request);
        if let Some(key) = api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| GatewayError::Upstream5xx { status: 0, body: e.to_string() })?;

        if !response.status().is_success() {
            return Err(classify_error_response(response).await);
        }

        let event_stream = response.bytes_stream().eventsource();
        let mut json_buffer = String::new();

        let mapped = event_stream
            .map(move |result| match result {
                Ok(event) => {
                    let data = event.data.trim().to_owned();
                    if data == "[DONE]" {
                        return vec![Ok(StreamEvent::Done)];
                    }
                    let Some(candidate) = crate::json_assembler::try_assemble(&mut json_buffer, &data) else {
                        return vec![];
                    };
                    match serde_json::from_str::<OpenAiStreamChunk>(&candidate) {
                        Ok(chunk) => openai_chunk_to_events(chunk).into_iter().map(Ok).collect(),
                        Err(e) => {
                            tracing::debug!(error = %e, "skipping unparseable SSE chunk");
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
