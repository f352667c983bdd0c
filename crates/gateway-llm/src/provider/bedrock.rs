//! AWS Bedrock Converse/ConverseStream API adapter.
//!
//! Grounded on `crates/synapse-llm/src/provider/bedrock.rs` for the client-construction
//! and event-loop shape; the pure request/response shaping lives in
//! `convert::bedrock` instead of inline here, matching this crate's protocol/convert/
//! provider layering. Deliberate deviation from the teacher's `BedrockConfig`: no
//! `access_key_id`/`secret_access_key` are accepted here, only a region — AWS
//! credentials are expected to come from the SDK's default credential chain (env vars,
//! IAM role, profile, IMDS), consistent with this crate's "no secrets in TOML" rule
//! (see `gateway-config::api_keys`).

use std::pin::Pin;

use async_trait::async_trait;
use aws_sdk_bedrockruntime::types::{ContentBlockDelta, ContentBlockStart, ConverseOutput, ConverseStreamOutput};
use aws_sdk_bedrockruntime::Client as BedrockClient;
use futures_util::{Stream, StreamExt};
use gateway_core::GatewayError;

use super::{Provider, ProviderCapabilities};
use crate::convert::bedrock::{build_converse_input, build_inference_config, build_tool_config, extract_message_content, map_stop_reason, usage_from_token_usage};
use crate::types::{Choice, ChoiceMessage, CompletionRequest, CompletionResponse, StreamDelta, StreamEvent, StreamFunctionCall, StreamToolCall};

pub struct BedrockProvider {
    client: BedrockClient,
}

impl BedrockProvider {
    /// Builds a Bedrock runtime client for `region` using the SDK's default credential
    /// provider chain.
    pub async fn new(region: String) -> Self {
        let aws_config = aws_config::defaults(aws_config::BehaviorVersion::latest()).region(aws_config::Region::new(region)).load().await;
        Self { client: BedrockClient::new(&aws_config) }
    }
}

#[async_trait]
impl Provider for BedrockProvider {
    fn name(&self) -> &str {
        "bedrock"
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities { streaming: true, tool_calling: true }
    }

    async fn complete(&self, request: &CompletionRequest, _api_key: Option<&str>) -> Result<CompletionResponse, GatewayError> {
        let (system_blocks, messages) = build_converse_input(request)?;

        let mut converse = self.client.converse().model_id(&request.model);
        for block in &system_blocks {
            converse = converse.system(block.clone());
        }
        for msg in &messages {
            converse = converse.messages(msg.clone());
        }
        converse = converse.inference_config(build_inference_config(request));
        if let Some(tool_config) = build_tool_config(request) {
            converse = converse.tool_config(tool_config);
        }

        let output = converse.send().await.map_err(|e| GatewayError::Upstream5xx { status: 0, body: e.to_string() })?;

        let finish_reason = Some(map_stop_reason(output.stop_reason()));
        let (content, tool_calls) = match output.output() {
            Some(ConverseOutput::Message(msg)) => extract_message_content(msg),
            _ => (None, None),
        };
        let usage = output.usage().map(usage_from_token_usage);

        let now = std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0);

        Ok(CompletionResponse {
            id: format!("bedrock-{now}"),
            object: "chat.completion".to_owned(),
            created: now,
            model: request.model.clone(),
            choices: vec![Choice {
                index: 0,
                message: ChoiceMessage {
                    role: "assistant".to_owned(),
                    content,
                    reasoning: None,
                    tool_calls,
                    images: Vec::new(),
                    annotations: Vec::new(),
                },
                finish_reason,
            }],
            usage,
            web_search_count: 0,
        })
    }

    async fn complete_stream(
        &self,
        request: &CompletionRequest,
        _api_key: Option<&str>,
    ) -> Result<Pin<Box<dyn Stream<Item = Result<StreamEvent, GatewayError>> + Send>>, GatewayError> {
        let (system_blocks, messages) = build_converse_input(request)?;

        let mut converse = self.client.converse_stream().model_id(&request.model);
        for block in &system_blocks {
            converse = converse.system(block.clone());
        }
        for msg in &messages {
            converse = converse.messages(msg.clone());
        }
        converse = converse.inference_config(build_inference_config(request));
        if let Some(tool_config) = build_tool_config(request) {
            converse = converse.tool_config(tool_config);
        }

        let output = converse.send().await.map_err(|e| GatewayError::Upstream5xx { status: 0, body: e.to_string() })?;
        let receiver = output.stream;

        let stream = futures_util::stream::unfold(receiver, |mut receiver| async move {
            match receiver.recv().await {
                Ok(Some(event)) => Some((bedrock_stream_event_to_canonical(&event), receiver)),
                Ok(None) => None,
                Err(e) => Some((vec![Err(GatewayError::Upstream5xx { status: 0, body: e.to_string() })], receiver)),
            }
        })
        .flat_map(futures_util::stream::iter);

        Ok(Box::pin(stream))
    }
}

/// §4.5 Bedrock rule: `contentBlockDelta.text`/`contentBlockDelta.toolUse` append,
/// `contentBlockStart.toolUse` opens, `messageStop.stopReason` closes with a finish
/// reason, `metadata.usage` carries the final usage. `messageStart` carries only role
/// (already implicit in the canonical model) so it yields nothing.
fn bedrock_stream_event_to_canonical(event: &ConverseStreamOutput) -> Vec<Result<StreamEvent, GatewayError>> {
    match event {
        ConverseStreamOutput::ContentBlockDelta(delta) => match delta.delta() {
            Some(ContentBlockDelta::Text(text)) => vec![Ok(StreamEvent::Delta(StreamDelta {
                index: 0,
                content: Some(text.clone()),
                reasoning: None,
                tool_call: None,
                images: Vec::new(),
                annotations: Vec::new(),
                finish_reason: None,
            }))],
            Some(ContentBlockDelta::ToolUse(tool)) => vec![Ok(StreamEvent::Delta(StreamDelta {
                index: 0,
                content: None,
                reasoning: None,
                tool_call: Some(StreamToolCall {
                    index: 0,
                    id: None,
                    function: Some(StreamFunctionCall { name: None, arguments: Some(tool.input().to_owned()) }),
                }),
                images: Vec::new(),
                annotations: Vec::new(),
                finish_reason: None,
            }))],
            _ => Vec::new(),
        },
        ConverseStreamOutput::ContentBlockStart(start) => match start.start() {
            Some(ContentBlockStart::ToolUse(tool)) => vec![Ok(StreamEvent::Delta(StreamDelta {
                index: 0,
                content: None,
                reasoning: None,
                tool_call: Some(StreamToolCall {
                    index: 0,
                    id: Some(tool.tool_use_id().to_owned()),
                    function: Some(StreamFunctionCall { name: Some(tool.name().to_owned()), arguments: None }),
                }),
                images: Vec::new(),
                annotations: Vec::new(),
                finish_reason: None,
            }))],
            _ => Vec::new(),
        },
        ConverseStreamOutput::MessageStop(stop) => vec![
            Ok(StreamEvent::Delta(StreamDelta {
                index: 0,
                content: None,
                reasoning: None,
                tool_call: None,
                images: Vec::new(),
                annotations: Vec::new(),
                finish_reason: Some(map_stop_reason(stop.stop_reason())),
            })),
            Ok(StreamEvent::Done),
        ],
        ConverseStreamOutput::Metadata(meta) => {
            meta.usage().map(|u| vec![Ok(StreamEvent::Usage(usage_from_token_usage(u)))]).unwrap_or_default()
        }
        _ => Vec::new(),
    }
}

