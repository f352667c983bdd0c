//! Google Generative Language API (`generateContent`/`streamGenerateContent`) adapter.
//!
//! Grounded on `crates/synapse-llm/src/provider/google.rs` for the URL/auth shape
//! (`?key=` query param, no bearer header) and this codebase's `provider/anthropic.rs`
//! for the `classify_error_response`/`eventsource_stream::Eventsource` pattern. The
//! teacher has no Redis dependency for its Google adapter; this one does, to satisfy
//! §4.4/§4.5's `thoughtSignature` persistence requirement so a later turn in the same
//! conversation can replay the signature back to the model.

use std::pin::Pin;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures_util::{Stream, StreamExt};
use gateway_core::GatewayError;
use redis::AsyncCommands;
use reqwest::Client;

use super::{Provider, ProviderCapabilities};
use crate::convert::google::{google_chunk_to_events, google_response_to_completion};
use crate::protocol::google::{GoogleRequest, GoogleResponse, GoogleStreamChunk};
use crate::types::{CompletionRequest, CompletionResponse, StreamEvent};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const THOUGHT_SIGNATURE_TTL_SECS: u64 = 86_400;

pub struct GoogleProvider {
    client: Client,
    base_url: String,
    redis: redis::aio::ConnectionManager,
}

impl GoogleProvider {
    #[must_use]
    pub fn new(base_url: Option<String>, redis: redis::aio::ConnectionManager) -> Self {
        Self { client: Client::new(), base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_owned()), redis }
    }

    fn generate_url(&self, model: &str, api_key: Option<&str>) -> String {
        let base = self.base_url.trim_end_matches('/');
        match api_key {
            Some(key) => format!("{base}/models/{model}:generateContent?key={key}"),
            None => format!("{base}/models/{model}:generateContent"),
        }
    }

    fn stream_url(&self, model: &str, api_key: Option<&str>) -> String {
        let base = self.base_url.trim_end_matches('/');
        match api_key {
            Some(key) => format!("{base}/models/{model}:streamGenerateContent?alt=sse&key={key}"),
            None => format!("{base}/models/{model}:streamGenerateContent?alt=sse"),
        }
    }

    async fn cache_signatures(redis: &mut redis::aio::ConnectionManager, signatures: Vec<(String, String)>) {
        for (tool_call_id, signature) in signatures {
            let key = format!("thought_signature:{tool_call_id}");
            if let Err(err) = redis.set_ex::<_, _, ()>(&key, signature, THOUGHT_SIGNATURE_TTL_SECS).await {
                tracing::warn!(error = %err, %tool_call_id, "failed to cache Google thought signature");
            }
        }
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
impl Provider for GoogleProvider {
    fn name(&self) -> &str {
        "google"
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities { streaming: true, tool_calling: true }
    }

    async fn complete(&self, request: &CompletionRequest, api_key: Option<&str>) -> Result<CompletionResponse, GatewayError> {
        let wire_request: GoogleRequest = request.into();

        let response = self
            .client
            .post(self.generate_url(&request.model, api_key))
            .json(&wire_request)
            .send()
            .await
            .map_err(|e| GatewayError::Upstream5xx { status: 0, body: e.to_string() })?;

        if !response.status().is_success() {
            return Err(classify_error_response(response).await);
        }

        let wire_response: GoogleResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::Internal(anyhow::anyhow!("failed to parse upstream response: {e}")))?;

        let (completion, signatures) = google_response_to_completion(wire_response);
        Self::cache_signatures(&mut self.redis.clone(), signatures).await;
        Ok(completion)
    }

    async fn complete_stream(
        &self,
        request: &CompletionRequest,
        api_key: Option<&str>,
    ) -> Result<Pin<Box<dyn Stream<Item = Result<StreamEvent, GatewayError>> + Send>>, GatewayError> {
        let wire_request: GoogleRequest = request.into();

        let response = self
            .client
            .post(self.stream_url(&request.model, api_key))
            .json(&wire_request)
            .send()
            .await
            .map_err(|e| GatewayError::Upstream5xx { status: 0, body: e.to_string() })?;

        if !response.status().is_success() {
            return Err(classify_error_response(response).await);
        }

        let event_stream = response.bytes_stream().eventsource();
        let mut redis = self.redis.clone();
        let mut json_buffer = String::new();

        let mapped = event_stream
            .map(move |result| match result {
                Ok(event) => {
                    let Some(candidate) = crate::json_assembler::try_assemble(&mut json_buffer, event.data.trim()) else {
                        return (vec![], vec![]);
                    };
                    match serde_json::from_str::<GoogleStreamChunk>(&candidate) {
                        Ok(chunk) => {
                            let now_unix = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0);
                            let (events, signatures) = google_chunk_to_events(&chunk, now_unix);
                            (events.into_iter().map(Ok).collect::<Vec<_>>(), signatures)
                        }
                        Err(e) => {
                            tracing::debug!(error = %e, "skipping unparseable Google SSE event");
                            (vec![], vec![])
                        }
                    }
                }
                Err(e) => (vec![Err(GatewayError::Upstream5xx { status: 0, body: e.to_string() })], vec![]),
            })
            .then(move |(events, signatures)| {
                let mut redis = redis.clone();
                async move {
                    GoogleProvider::cache_signatures(&mut redis, signatures).await;
                    futures_util::stream::iter(events)
                }
            })
            .flatten();

        Ok(Box::pin(mapped))
    }
}
