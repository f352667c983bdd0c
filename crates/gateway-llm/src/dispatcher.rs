//! C8 — Dispatcher: the end-to-end request lifecycle (§4.8).
//!
//! Grounded on `crates/synapse-llm/src/router.rs` (`LlmState::complete_with_failover` /
//! `complete_stream_with_failover`) for the overall retry/failover orchestration shape,
//! and `crates/synapse-billing/src/recorder.rs` (`UsageRecorder::record`) for the
//! fire-and-forget, non-blocking log emission in step 9.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use futures_util::{Stream, StreamExt};
use gateway_catalog::{Catalog, Mapping};
use gateway_core::{GatewayError, Identity, RequestContext, RequestMode, UnifiedFinishReason};
use rust_decimal::prelude::ToPrimitive;
use secrecy::{ExposeSecret, SecretString};

use crate::cost::{self, CostBreakdown, CostInputs};
use crate::health::KeyHealthTracker;
use crate::provider::Provider;
use crate::resolver::{self, GATEWAY_SENTINEL_PROVIDER};
use crate::scorer::{self, ProviderMetrics, RoutingMetadata};
use crate::types::{CompletionRequest, CompletionResponse, FinishReason, FunctionCall, Image, StreamEvent, ToolCall, Usage};

/// One configured upstream API key, addressed the way §4.2's health tracker addresses
/// it: by the env var it came from plus its index within that var's comma-separated list.
#[derive(Debug, Clone)]
pub struct ApiKey {
    pub env_var: String,
    pub index: u32,
    pub secret: SecretString,
}

/// Supplies the configured upstream keys for a provider id. Implemented by
/// `gateway-config` in the full gateway; injected here as a trait object so this crate
/// stays config-format-agnostic.
pub trait ApiKeySource: Send + Sync {
    fn keys_for(&self, provider_id: &str) -> &[ApiKey];
}

/// A record destined for the (Redis-backed, §4.9) log queue. The dispatcher only holds
/// the sending half of the channel that carries these; §4.9's consumer owns draining it.
#[derive(Debug, Clone)]
pub struct LogRecord {
    pub identity: Identity,
    /// Whether this request used the caller's BYOK key rather than a configured pool
    /// key — §4.10 bills these differently (BYOK fee vs. full credit deduction).
    pub used_byok: bool,
    /// Mode the api key was validated under (§4.8 step 1), distinct from `used_byok`'s
    /// actual-key-used outcome.
    pub mode: RequestMode,
    pub requested_model: String,
    pub used_model: String,
    pub used_provider: String,
    pub has_error: bool,
    pub error_details: Option<String>,
    pub unified_finish_reason: UnifiedFinishReason,
    pub canceled: bool,
    pub cost: Option<CostBreakdown>,
    pub usage: Option<Usage>,
    pub routing_metadata: Option<RoutingMetadata>,
    pub source: Option<String>,
    pub created_at_unix: u64,
    pub duration_ms: u64,
    pub time_to_first_token_ms: Option<u64>,
    pub response_size: u64,
    pub content: Option<String>,
    pub reasoning_content: Option<String>,
    /// The request's tool definitions, JSON-encoded (stripped on `retentionLevel == none`).
    pub tools: Option<serde_json::Value>,
    /// The assistant's tool invocations, JSON-encoded (stripped on `retentionLevel == none`).
    pub tool_results: Option<serde_json::Value>,
    pub streamed: bool,
    pub cached: bool,
}

/// Every candidate worth attempting for one request, in the order the dispatcher should
/// try them, with the scoring explanation attached to the first attempt's log record.
struct AttemptPlan<'a> {
    ordered: Vec<&'a Mapping>,
    metadata: RoutingMetadata,
    /// The canonical catalog model id the resolver settled on — distinct from the
    /// client's raw `request.model` string, which may carry a `provider/` prefix.
    resolved_model: String,
}

fn now_unix() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or_default()
}

fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// Wires together the Resolver, Key Health Tracker, Scorer, Cost Engine, and the
/// per-family provider adapters into the full request lifecycle of §4.8.
pub struct Dispatcher {
    catalog: Arc<Catalog>,
    health: Arc<KeyHealthTracker>,
    providers: HashMap<String, Arc<dyn Provider>>,
    keys: Arc<dyn ApiKeySource>,
    log_tx: tokio::sync::mpsc::UnboundedSender<LogRecord>,
    /// Uptime threshold below which the Dispatcher treats the Scorer's top pick as
    /// worth falling back from (§4.8 step 4), even though it otherwise beat the field.
    min_uptime_for_fallback: f64,
}

impl Dispatcher {
    #[must_use]
    pub fn new(
        catalog: Arc<Catalog>,
        health: Arc<KeyHealthTracker>,
        providers: HashMap<String, Arc<dyn Provider>>,
        keys: Arc<dyn ApiKeySource>,
        log_tx: tokio::sync::mpsc::UnboundedSender<LogRecord>,
    ) -> Self {
        Self { catalog, health, providers, keys, log_tx, min_uptime_for_fallback: 80.0 }
    }

    fn provider_priority(&self, provider_id: &str) -> Option<f64> {
        self.catalog.provider(provider_id).and_then(|p| p.priority.to_f64())
    }

    /// Aggregate a provider's per-key health metrics into the single `ProviderMetrics`
    /// the Scorer (§4.3) consumes. Mapping lacks a provider-level uptime of its own;
    /// this synthesizes one by averaging across the provider's configured keys,
    /// weighted by each key's observed sample count.
    fn provider_metrics(&self, provider_id: &str) -> Option<ProviderMetrics> {
        let keys = self.keys.keys_for(provider_id);
        if keys.is_empty() {
            return None;
        }
        let mut weighted_uptime = 0.0;
        let mut total_samples = 0u64;
        for key in keys {
            let metrics = self.health.metrics(&key.env_var, key.index);
            weighted_uptime += metrics.uptime * metrics.total as f64;
            total_samples += metrics.total;
        }
        let uptime = if total_samples == 0 { 100.0 } else { weighted_uptime / total_samples as f64 };
        Some(ProviderMetrics { uptime: Some(uptime), average_latency: None, throughput: None })
    }

    /// Resolve, filter (§4.8 steps 2–3), and score (step 4) into an ordered attempt plan.
    ///
    /// When the Scorer's top pick has sub-threshold uptime and fallback is allowed, the
    /// next-best candidate is promoted ahead of it and `original_provider`/
    /// `original_provider_uptime` are recorded up front (§4.8 step 4) — a proactive
    /// fallback, distinct from the reactive one `complete`/`complete_stream` perform
    /// after an actual request failure.
    fn plan<'a>(
        &self,
        catalog: &'a Catalog,
        model_input: &str,
        is_streaming: bool,
        fallback_allowed: bool,
    ) -> Result<AttemptPlan<'a>, GatewayError> {
        let resolved = resolver::resolve(catalog, model_input)?;
        if resolved.requested_provider.as_deref() == Some(GATEWAY_SENTINEL_PROVIDER) {
            return Err(GatewayError::BadRequest(format!(
                "\"{model_input}\" requires gateway-level model selection, not yet supported by this dispatcher"
            )));
        }

        let now = chrono::Utc::now();
        let mut mappings = catalog.available_mappings(&resolved.requested_model, now);
        if let Some(provider) = &resolved.requested_provider {
            mappings.retain(|m| &m.provider_id == provider);
        }
        if mappings.is_empty() {
            return Err(GatewayError::BadRequest(format!("no available provider for model \"{model_input}\"")));
        }

        let metrics_of = |provider_id: &str| self.provider_metrics(provider_id);
        let priority_of = |provider_id: &str| self.provider_priority(provider_id);
        let Some((_, mut metadata)) = scorer::score(&mappings, metrics_of, priority_of, is_streaming, true) else {
            return Err(GatewayError::BadRequest(format!("no available provider for model \"{model_input}\"")));
        };

        let order = order_for_attempts(&mappings, &metadata);
        let mut ordered = Vec::with_capacity(order.len());
        for provider_id in &order {
            if let Some(mapping) = mappings.iter().find(|m| &m.provider_id == provider_id) {
                ordered.push(*mapping);
            }
        }

        if fallback_allowed && ordered.len() > 1 {
            let top_uptime = self.provider_metrics(&metadata.chosen_provider).and_then(|m| m.uptime);
            if top_uptime.is_some_and(|u| u < self.min_uptime_for_fallback) {
                metadata.original_provider = Some(metadata.chosen_provider.clone());
                metadata.original_provider_uptime = top_uptime;
                metadata.chosen_provider = ordered[1].provider_id.clone();
                ordered.swap(0, 1);
            }
        }

        Ok(AttemptPlan { ordered, metadata, resolved_model: resolved.requested_model })
    }

    /// Picks the key to send upstream with, honoring BYOK override (§4.8 step 5) ahead
    /// of the configured pool. Returns `None` alongside the chosen secret when BYOK is
    /// used, since BYOK keys are never tracked by the Key Health Tracker.
    fn select_key(&self, provider_id: &str, ctx: &RequestContext) -> (Option<SecretString>, Option<(String, u32)>) {
        if let Some(byok) = &ctx.byok_key {
            return (Some(byok.clone()), None);
        }

        let keys = self.keys.keys_for(provider_id);
        if keys.is_empty() {
            return (None, None);
        }

        if let Some(key) = keys.iter().find(|k| self.health.is_healthy(&k.env_var, k.index)) {
            return (Some(key.secret.clone()), Some((key.env_var.clone(), key.index)));
        }

        // Every key unhealthy: reuse the least-unhealthy one (§4.8 step 5).
        let least_unhealthy = keys
            .iter()
            .max_by(|a, b| {
                let ua = self.health.metrics(&a.env_var, a.index).uptime;
                let ub = self.health.metrics(&b.env_var, b.index).uptime;
                ua.partial_cmp(&ub).unwrap_or(std::cmp::Ordering::Equal)
            })
            .expect("keys is non-empty");
        (Some(least_unhealthy.secret.clone()), Some((least_unhealthy.env_var.clone(), least_unhealthy.index)))
    }

    fn emit_log(&self, record: LogRecord) {
        // Fire-and-forget: a dropped receiver (e.g. during shutdown) just means the
        // record is lost, matching the teacher's recorder.rs `send` (errors logged,
        // never propagated to the caller).
        if self.log_tx.send(record).is_err() {
            tracing::warn!("log queue receiver dropped; log record lost");
        }
    }

    /// §4.8, non-streaming path (step 6's "collect full body" branch through step 9).
    pub async fn complete(
        &self,
        request: CompletionRequest,
        ctx: &RequestContext,
    ) -> Result<CompletionResponse, GatewayError> {
        let start = Instant::now();
        let plan = self.plan(&self.catalog, &request.model, false, !ctx.no_fallback)?;
        let mut metadata = plan.metadata;
        let mut last_err = None;
        let request_tools = request.tools.as_ref().and_then(|tools| serde_json::to_value(tools).ok());

        for (attempt_idx, mapping) in plan.ordered.iter().enumerate() {
            if attempt_idx > 0 {
                metadata.original_provider.get_or_insert_with(|| metadata.chosen_provider.clone());
                metadata.original_provider_uptime.get_or_insert_with(|| {
                    self.provider_metrics(&metadata.chosen_provider).and_then(|m| m.uptime).unwrap_or(100.0)
                });
            }
            metadata.no_fallback = ctx.no_fallback;

            let Some(provider) = self.providers.get(&mapping.provider_id) else {
                last_err = Some(GatewayError::Internal(anyhow::anyhow!(
                    "no provider adapter registered for \"{}\"",
                    mapping.provider_id
                )));
                continue;
            };
            let (secret, key_ref) = self.select_key(&mapping.provider_id, ctx);

            let mut wire_request = request.clone();
            wire_request.model = mapping.model_name.clone();

            match provider.complete(&wire_request, secret.as_ref().map(|s| s.expose_secret().as_str())).await {
                Ok(mut response) => {
                    if let Some((env_var, idx)) = &key_ref {
                        self.health.report_success(env_var, *idx);
                    }
                    response.model = request.model.clone();
                    let cost = response.usage.as_ref().and_then(|usage| {
                        cost::compute(
                            &self.catalog,
                            &plan.resolved_model,
                            &mapping.provider_id,
                            &CostInputs {
                                prompt_tokens: Some(u64::from(usage.prompt_tokens)),
                                completion_tokens: u64::from(usage.completion_tokens),
                                cached_tokens: u64::from(usage.cached_tokens),
                                reasoning_tokens: u64::from(usage.reasoning_tokens),
                                input_image_count: 0,
                                output_image_count: u64::try_from(response.choices.first().map_or(0, |c| c.message.images.len())).unwrap_or_default(),
                                image_size: None,
                                web_search_count: u64::from(response.web_search_count),
                            },
                        )
                    });
                    let unified = response
                        .choices
                        .first()
                        .and_then(|c| c.finish_reason.as_ref())
                        .map_or(UnifiedFinishReason::Unknown, FinishReason::to_unified);
                    let message = response.choices.first().map(|c| &c.message);
                    let tool_results =
                        message.and_then(|m| m.tool_calls.as_ref()).and_then(|tc| serde_json::to_value(tc).ok());

                    self.emit_log(LogRecord {
                        identity: ctx.identity.clone(),
                        used_byok: ctx.byok_key.is_some(),
                        mode: ctx.mode,
                        requested_model: request.model.clone(),
                        used_model: mapping.model_name.clone(),
                        used_provider: mapping.provider_id.clone(),
                        has_error: false,
                        error_details: None,
                        unified_finish_reason: unified,
                        canceled: false,
                        cost,
                        usage: response.usage.clone(),
                        routing_metadata: Some(metadata.clone()),
                        source: ctx.source.clone(),
                        created_at_unix: now_unix(),
                        duration_ms: elapsed_ms(start),
                        time_to_first_token_ms: None,
                        response_size: serde_json::to_vec(&response).map_or(0, |bytes| bytes.len() as u64),
                        content: message.and_then(|m| m.content.clone()),
                        reasoning_content: message.and_then(|m| m.reasoning.clone()),
                        tools: request_tools.clone(),
                        tool_results,
                        streamed: false,
                        cached: response.usage.as_ref().is_some_and(|u| u.cached_tokens > 0),
                    });
                    return Ok(response);
                }
                Err(err) => {
                    if let Some((env_var, idx)) = &key_ref {
                        let (status, body) = error_status_and_body(&err);
                        self.health.report_error(env_var, *idx, status, body.as_deref());
                    }
                    let retryable = err.is_retryable() && !ctx.no_fallback && attempt_idx + 1 < plan.ordered.len();
                    if !retryable {
                        self.emit_log(LogRecord {
                            identity: ctx.identity.clone(),
                            used_byok: ctx.byok_key.is_some(),
                            mode: ctx.mode,
                            requested_model: request.model.clone(),
                            used_model: mapping.model_name.clone(),
                            used_provider: mapping.provider_id.clone(),
                            has_error: true,
                            error_details: Some(err.to_string()),
                            unified_finish_reason: err.unified_finish_reason(),
                            canceled: false,
                            cost: None,
                            usage: None,
                            routing_metadata: Some(metadata.clone()),
                            source: ctx.source.clone(),
                            created_at_unix: now_unix(),
                            duration_ms: elapsed_ms(start),
                            time_to_first_token_ms: None,
                            response_size: 0,
                            content: None,
                            reasoning_content: None,
                            tools: request_tools.clone(),
                            tool_results: None,
                            streamed: false,
                            cached: false,
                        });
                        return Err(err);
                    }
                    last_err = Some(err);
                }
            }
        }

        Err(last_err.unwrap_or_else(|| GatewayError::Internal(anyhow::anyhow!("no candidates attempted"))))
    }

    /// §4.8, streaming path (step 6's "stream" branch). Failover across candidates only
    /// happens before the first byte is read from the chosen upstream; once streaming
    /// has begun, a mid-stream error surfaces to the caller (the client has already
    /// received partial output and a silent provider swap would corrupt it).
    pub async fn complete_stream(
        &self,
        request: CompletionRequest,
        ctx: &RequestContext,
    ) -> Result<(String, String, Pin<Box<dyn Stream<Item = Result<StreamEvent, GatewayError>> + Send>>), GatewayError>
    {
        let start = Instant::now();
        let plan = self.plan(&self.catalog, &request.model, true, !ctx.no_fallback)?;
        let mut metadata = plan.metadata;
        let mut last_err = None;
        let request_tools = request.tools.as_ref().and_then(|tools| serde_json::to_value(tools).ok());

        for (attempt_idx, mapping) in plan.ordered.iter().enumerate() {
            if attempt_idx > 0 {
                metadata.original_provider.get_or_insert_with(|| metadata.chosen_provider.clone());
            }
            metadata.no_fallback = ctx.no_fallback;

            let Some(provider) = self.providers.get(&mapping.provider_id) else {
                last_err = Some(GatewayError::Internal(anyhow::anyhow!(
                    "no provider adapter registered for \"{}\"",
                    mapping.provider_id
                )));
                continue;
            };
            let (secret, key_ref) = self.select_key(&mapping.provider_id, ctx);

            let mut wire_request = request.clone();
            wire_request.model = mapping.model_name.clone();

            match provider.complete_stream(&wire_request, secret.as_ref().map(|s| s.expose_secret().as_str())).await {
                Ok(stream) => {
                    if let Some((env_var, idx)) = &key_ref {
                        self.health.report_success(env_var, *idx);
                    }

                    let logged = StreamLogger {
                        catalog: Arc::clone(&self.catalog),
                        log_tx: self.log_tx.clone(),
                        identity: ctx.identity.clone(),
                        used_byok: ctx.byok_key.is_some(),
                        mode: ctx.mode,
                        requested_model: request.model.clone(),
                        resolved_model: plan.resolved_model.clone(),
                        used_model: mapping.model_name.clone(),
                        used_provider: mapping.provider_id.clone(),
                        routing_metadata: metadata.clone(),
                        source: ctx.source.clone(),
                        tools: request_tools.clone(),
                        start,
                    };
                    let wrapped = tap_stream_for_logging(stream, logged);
                    return Ok((mapping.provider_id.clone(), mapping.model_name.clone(), wrapped));
                }
                Err(err) => {
                    if let Some((env_var, idx)) = &key_ref {
                        let (status, body) = error_status_and_body(&err);
                        self.health.report_error(env_var, *idx, status, body.as_deref());
                    }
                    let retryable = err.is_retryable() && !ctx.no_fallback && attempt_idx + 1 < plan.ordered.len();
                    if !retryable {
                        self.emit_log(LogRecord {
                            identity: ctx.identity.clone(),
                            used_byok: ctx.byok_key.is_some(),
                            mode: ctx.mode,
                            requested_model: request.model.clone(),
                            used_model: mapping.model_name.clone(),
                            used_provider: mapping.provider_id.clone(),
                            has_error: true,
                            error_details: Some(err.to_string()),
                            unified_finish_reason: err.unified_finish_reason(),
                            canceled: false,
                            cost: None,
                            usage: None,
                            routing_metadata: Some(metadata.clone()),
                            source: ctx.source.clone(),
                            created_at_unix: now_unix(),
                            duration_ms: elapsed_ms(start),
                            time_to_first_token_ms: None,
                            response_size: 0,
                            content: None,
                            reasoning_content: None,
                            tools: request_tools.clone(),
                            tool_results: None,
                            streamed: true,
                            cached: false,
                        });
                        return Err(err);
                    }
                    last_err = Some(err);
                }
            }
        }

        Err(last_err.unwrap_or_else(|| GatewayError::Internal(anyhow::anyhow!("no candidates attempted"))))
    }
}

/// Everything a [`StreamAccumulator`] needs to turn itself into one [`LogRecord`] once
/// the stream it's tapping reaches its end — a snapshot of the state `complete_stream`
/// held, since the returned stream outlives that call.
struct StreamLogger {
    catalog: Arc<Catalog>,
    log_tx: tokio::sync::mpsc::UnboundedSender<LogRecord>,
    identity: Identity,
    used_byok: bool,
    mode: RequestMode,
    requested_model: String,
    resolved_model: String,
    used_model: String,
    used_provider: String,
    routing_metadata: RoutingMetadata,
    source: Option<String>,
    tools: Option<serde_json::Value>,
    start: Instant,
}

impl StreamLogger {
    fn emit(self, acc: StreamAccumulator) {
        let cost = acc.usage.as_ref().and_then(|usage| {
            cost::compute(
                &self.catalog,
                &self.resolved_model,
                &self.used_provider,
                &CostInputs {
                    prompt_tokens: Some(u64::from(usage.prompt_tokens)),
                    completion_tokens: u64::from(usage.completion_tokens),
                    cached_tokens: u64::from(usage.cached_tokens),
                    reasoning_tokens: u64::from(usage.reasoning_tokens),
                    input_image_count: 0,
                    output_image_count: u64::try_from(acc.images.len()).unwrap_or_default(),
                    image_size: None,
                    // Streaming deltas carry annotations but no dedicated web-search-count
                    // event; undercounts webSearchCost rather than guess from annotations.
                    web_search_count: 0,
                },
            )
        });
        let unified = acc.finish_reason.as_ref().map_or(UnifiedFinishReason::Unknown, FinishReason::to_unified);
        let cached = acc.usage.as_ref().is_some_and(|u| u.cached_tokens > 0);
        let (tool_results, response_size) = acc.into_tool_results_and_size();

        let record = LogRecord {
            identity: self.identity,
            used_byok: self.used_byok,
            mode: self.mode,
            requested_model: self.requested_model,
            used_model: self.used_model,
            used_provider: self.used_provider,
            has_error: false,
            error_details: None,
            unified_finish_reason: unified,
            canceled: false,
            cost,
            usage: acc.usage,
            routing_metadata: Some(self.routing_metadata),
            source: self.source,
            created_at_unix: now_unix(),
            duration_ms: elapsed_ms(self.start),
            time_to_first_token_ms: acc.first_token_ms,
            response_size,
            content: (!acc.content.is_empty()).then_some(acc.content),
            reasoning_content: (!acc.reasoning.is_empty()).then_some(acc.reasoning),
            tools: self.tools,
            tool_results,
            streamed: true,
            cached,
        };

        if self.log_tx.send(record).is_err() {
            tracing::warn!("log queue receiver dropped; log record lost");
        }
    }
}

#[derive(Default)]
struct ToolCallAccumulator {
    id: Option<String>,
    name: Option<String>,
    arguments: String,
}

/// Reconstructs the `content`/`reasoningContent`/`toolResults`/usage/finish-reason/
/// time-to-first-token a full response would have carried, by folding over the
/// `StreamEvent`s that flow through `complete_stream`'s returned stream (§4.9 step 9's
/// log record needs these regardless of whether the client asked to stream).
#[derive(Default)]
struct StreamAccumulator {
    content: String,
    reasoning: String,
    tool_calls: std::collections::BTreeMap<u32, ToolCallAccumulator>,
    images: Vec<Image>,
    usage: Option<Usage>,
    finish_reason: Option<FinishReason>,
    first_token_ms: Option<u64>,
}

impl StreamAccumulator {
    fn observe(&mut self, event: &StreamEvent, elapsed_ms: u64) {
        match event {
            StreamEvent::Delta(delta) => {
                if delta.content.is_some() || delta.reasoning.is_some() || delta.tool_call.is_some() {
                    self.first_token_ms.get_or_insert(elapsed_ms);
                }
                if let Some(content) = &delta.content {
                    self.content.push_str(content);
                }
                if let Some(reasoning) = &delta.reasoning {
                    self.reasoning.push_str(reasoning);
                }
                if let Some(tool_call) = &delta.tool_call {
                    let entry = self.tool_calls.entry(tool_call.index).or_default();
                    if let Some(id) = &tool_call.id {
                        entry.id = Some(id.clone());
                    }
                    if let Some(function) = &tool_call.function {
                        if let Some(name) = &function.name {
                            entry.name = Some(name.clone());
                        }
                        if let Some(arguments) = &function.arguments {
                            entry.arguments.push_str(arguments);
                        }
                    }
                }
                self.images.extend(delta.images.iter().cloned());
                if let Some(finish_reason) = &delta.finish_reason {
                    self.finish_reason = Some(finish_reason.clone());
                }
            }
            StreamEvent::Usage(usage) => self.usage = Some(usage.clone()),
            StreamEvent::Done => {}
        }
    }

    fn into_tool_results_and_size(self) -> (Option<serde_json::Value>, u64) {
        let calls: Vec<ToolCall> = self
            .tool_calls
            .into_values()
            .filter_map(|acc| Some(ToolCall { id: acc.id?, function: FunctionCall { name: acc.name?, arguments: acc.arguments } }))
            .collect();
        let response_size = (self.content.len() + self.reasoning.len()) as u64;
        let tool_results = if calls.is_empty() { None } else { serde_json::to_value(&calls).ok() };
        (tool_results, response_size)
    }
}

/// Wraps a provider's event stream so every event is folded into a [`StreamAccumulator`]
/// as it passes through, emitting exactly one [`LogRecord`] once the stream ends —
/// success or error, whichever comes first (§4.8: "once streaming has begun, a mid-stream
/// error surfaces to the caller" — the log record for that still belongs to this request).
fn tap_stream_for_logging(
    stream: Pin<Box<dyn Stream<Item = Result<StreamEvent, GatewayError>> + Send>>,
    logger: StreamLogger,
) -> Pin<Box<dyn Stream<Item = Result<StreamEvent, GatewayError>> + Send>> {
    let start = logger.start;
    let state = (stream, StreamAccumulator::default(), Some(logger));
    Box::pin(futures_util::stream::unfold(state, move |(mut inner, mut acc, mut logger)| async move {
        match inner.next().await {
            Some(Ok(event)) => {
                acc.observe(&event, elapsed_ms(start));
                Some((Ok(event), (inner, acc, logger)))
            }
            Some(Err(err)) => {
                if let Some(logger) = logger.take() {
                    logger.emit(acc);
                }
                Some((Err(err), (inner, StreamAccumulator::default(), logger)))
            }
            None => {
                if let Some(logger) = logger.take() {
                    logger.emit(acc);
                }
                None
            }
        }
    }))
}

fn error_status_and_body(err: &GatewayError) -> (Option<u16>, Option<String>) {
    match err {
        GatewayError::Upstream4xx { status, body } | GatewayError::Upstream5xx { status, body } => {
            (Some(*status), Some(body.clone()))
        }
        _ => (None, None),
    }
}

/// Turns the Scorer's `RoutingMetadata` into a concrete attempt order. When the
/// ε-greedy exploration draw fired, `candidates` is empty, so the chosen provider is
/// tried first and the rest follow in their original (resolver/catalog) order.
fn order_for_attempts(mappings: &[&Mapping], metadata: &RoutingMetadata) -> Vec<String> {
    if metadata.candidates.is_empty() {
        let mut ids = vec![metadata.chosen_provider.clone()];
        ids.extend(mappings.iter().map(|m| m.provider_id.clone()).filter(|p| *p != metadata.chosen_provider));
        return ids;
    }

    let mut scored = metadata.candidates.clone();
    scored.sort_by(|a, b| a.score.partial_cmp(&b.score).unwrap_or(std::cmp::Ordering::Equal));
    scored.into_iter().map(|c| c.provider_id).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_catalog::Stability;
    use rust_decimal::Decimal;

    fn mapping(provider_id: &str) -> Mapping {
        Mapping {
            provider_id: provider_id.to_owned(),
            model_name: format!("{provider_id}-model"),
            input_price: Decimal::new(1, 0),
            output_price: Decimal::new(1, 0),
            cached_input_price: None,
            image_input_price: None,
            image_output_price: None,
            request_price: None,
            web_search_price: None,
            pricing_tiers: Vec::new(),
            context_size: None,
            max_output: None,
            streaming: true,
            vision: false,
            reasoning: false,
            tools: true,
            json_output: true,
            web_search: false,
            discount: Decimal::ZERO,
            stability: Stability::Stable,
            deprecated_at: None,
            deactivated_at: None,
        }
    }

    #[test]
    fn order_for_attempts_puts_scored_winner_first() {
        let a = mapping("a");
        let b = mapping("b");
        let mappings = vec![&a, &b];
        let metadata = RoutingMetadata {
            reason: "weighted-score".to_owned(),
            available_providers: vec!["a".into(), "b".into()],
            candidates: vec![
                scorer::CandidateScore {
                    provider_id: "b".into(),
                    score: 0.1,
                    uptime: None,
                    latency: None,
                    throughput: None,
                    price: 1.0,
                    priority: 1.0,
                },
                scorer::CandidateScore {
                    provider_id: "a".into(),
                    score: 0.9,
                    uptime: None,
                    latency: None,
                    throughput: None,
                    price: 1.0,
                    priority: 1.0,
                },
            ],
            chosen_provider: "b".into(),
            original_provider: None,
            original_provider_uptime: None,
            no_fallback: false,
        };
        let order = order_for_attempts(&mappings, &metadata);
        assert_eq!(order, vec!["b".to_owned(), "a".to_owned()]);
    }

    #[test]
    fn order_for_attempts_handles_exploration_draw() {
        let a = mapping("a");
        let b = mapping("b");
        let mappings = vec![&a, &b];
        let metadata = RoutingMetadata {
            reason: "random-exploration".to_owned(),
            available_providers: vec!["a".into(), "b".into()],
            candidates: Vec::new(),
            chosen_provider: "b".into(),
            original_provider: None,
            original_provider_uptime: None,
            no_fallback: false,
        };
        let order = order_for_attempts(&mappings, &metadata);
        assert_eq!(order, vec!["b".to_owned(), "a".to_owned()]);
    }
}
