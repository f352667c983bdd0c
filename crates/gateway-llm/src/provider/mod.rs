//! The `Provider` trait: the seam every upstream wire-format adapter implements.
//!
//! Grounded on `crates/synapse-llm/src/provider/mod.rs` for the trait shape; header-rule
//! forwarding is dropped (no equivalent in SPEC_FULL.md — provider auth is a single
//! configured or BYOK key, not a header-rewrite pipeline).

pub mod anthropic;
pub mod bedrock;
pub mod google;
pub mod image_gen;
pub mod openai_compatible;
pub mod openai_responses;
pub mod quirks;

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;
use gateway_core::GatewayError;

use crate::types::{CompletionRequest, CompletionResponse, StreamEvent};

/// Capabilities advertised by a provider adapter.
#[derive(Debug, Clone, Copy)]
pub struct ProviderCapabilities {
    pub streaming: bool,
    pub tool_calling: bool,
}

/// One upstream's request/response wire-format adapter.
#[async_trait]
pub trait Provider: Send + Sync {
    fn name(&self) -> &str;

    fn capabilities(&self) -> ProviderCapabilities;

    async fn complete(&self, request: &CompletionRequest, api_key: Option<&str>) -> Result<CompletionResponse, GatewayError>;

    async fn complete_stream(
        &self,
        request: &CompletionRequest,
        api_key: Option<&str>,
    ) -> Result<Pin<Box<dyn Stream<Item = Result<StreamEvent, GatewayError>> + Send>>, GatewayError>;
}
