use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// An upstream provider (e.g. `openai`, `anthropic`, `together.ai`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Provider {
    pub id: String,
    pub name: String,
    #[serde(default = "default_priority")]
    pub priority: Decimal,
    #[serde(default)]
    pub streaming: Option<bool>,
    #[serde(default)]
    pub cancellation: Option<bool>,
}

fn default_priority() -> Decimal {
    Decimal::ONE
}

/// Model stability, coarsest to finest trust.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stability {
    Stable,
    Beta,
    Unstable,
    Experimental,
}

/// A catalog model: one canonical id fanning out to per-provider mappings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Model {
    pub id: String,
    pub family: String,
    #[serde(default)]
    pub free: bool,
    pub output: Vec<String>,
    pub stability: Stability,
    pub providers: Vec<Mapping>,
}

/// One `(model, provider)` mapping: wire-format name, pricing, and capability flags.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Mapping {
    #[serde(rename = "providerId")]
    pub provider_id: String,
    #[serde(rename = "modelName")]
    pub model_name: String,
    pub input_price: Decimal,
    pub output_price: Decimal,
    #[serde(default)]
    pub cached_input_price: Option<Decimal>,
    #[serde(default)]
    pub image_input_price: Option<Decimal>,
    #[serde(default)]
    pub image_output_price: Option<Decimal>,
    #[serde(default)]
    pub request_price: Option<Decimal>,
    #[serde(default)]
    pub web_search_price: Option<Decimal>,
    #[serde(default)]
    pub pricing_tiers: Vec<PricingTier>,
    #[serde(default)]
    pub context_size: Option<u64>,
    #[serde(default)]
    pub max_output: Option<u64>,
    #[serde(default)]
    pub streaming: bool,
    #[serde(default)]
    pub vision: bool,
    #[serde(default)]
    pub reasoning: bool,
    #[serde(default)]
    pub tools: bool,
    #[serde(default)]
    pub json_output: bool,
    #[serde(default)]
    pub web_search: bool,
    #[serde(default)]
    pub discount: Decimal,
    pub stability: Stability,
    #[serde(default)]
    pub deprecated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub deactivated_at: Option<DateTime<Utc>>,
}

impl Mapping {
    /// §3 invariant: a model is "available from a provider" iff `now < deactivatedAt ∨ deactivatedAt = ⊥`.
    #[must_use]
    pub fn is_available(&self, now: DateTime<Utc>) -> bool {
        self.deactivated_at.is_none_or(|deactivated| now < deactivated)
    }
}

/// A tiered pricing bracket, selected by `promptTokens ≤ upToTokens` (§4.7 step 4).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PricingTier {
    pub up_to_tokens: u64,
    pub input_price: Decimal,
    pub output_price: Decimal,
    #[serde(default)]
    pub cached_input_price: Option<Decimal>,
    pub name: String,
}
