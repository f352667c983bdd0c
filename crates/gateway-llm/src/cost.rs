//! C7 — Cost Engine: tiered, discounted, cached/image/web-search-aware cost
//! computation in arbitrary-precision decimal arithmetic.
//!
//! Grounded on `LLM-Dev-Ops-governance-dashboard/services/cost-service` for the
//! `rust_decimal`/`num-traits` decimal-math pairing — the teacher carries no such
//! dependency since it forwards billing to an external service. Token estimation
//! (step 2) reuses the teacher's `tiktoken-rs` dependency.

use std::sync::OnceLock;

use gateway_catalog::{Catalog, Mapping};
use rust_decimal::Decimal;

/// Token-count estimate for upstream responses that omit a usage field (§4.4 Google rule,
/// §4.7 step 2). `cl100k_base` is an approximation for non-OpenAI models but is the only
/// shared estimator available across providers.
#[must_use]
pub fn estimate_tokens(text: &str) -> u64 {
    static ENCODER: OnceLock<tiktoken_rs::CoreBPE> = OnceLock::new();
    let encoder = ENCODER.get_or_init(|| tiktoken_rs::cl100k_base().expect("cl100k_base encoder ships with tiktoken-rs"));
    encoder.encode_with_special_tokens(text).len() as u64
}

/// Image-size-dependent token cost for output images (§4.7 step 5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageSize {
    Standard,
    FourK,
}

/// Inputs to a single cost computation (§4.7).
#[derive(Debug, Clone, Default)]
pub struct CostInputs {
    pub prompt_tokens: Option<u64>,
    pub completion_tokens: u64,
    pub cached_tokens: u64,
    pub reasoning_tokens: u64,
    pub input_image_count: u64,
    pub output_image_count: u64,
    pub image_size: Option<ImageSize>,
    pub web_search_count: u64,
}

/// Every cost component plus the metadata the log record needs (§3, §4.7 step 6).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CostBreakdown {
    pub input_cost: Decimal,
    pub output_cost: Decimal,
    pub cached_input_cost: Decimal,
    pub request_cost: Decimal,
    pub image_input_cost: Decimal,
    pub image_output_cost: Decimal,
    pub web_search_cost: Decimal,
    pub total_cost: Decimal,
    pub pricing_tier: Option<String>,
    pub discount: Option<Decimal>,
    pub estimated_cost: bool,
}

const IMAGE_INPUT_TOKEN_EQUIVALENT: u64 = 560;
const IMAGE_OUTPUT_TOKENS_STANDARD: u64 = 1120;
const IMAGE_OUTPUT_TOKENS_4K: u64 = 2000;

/// Select the Model+Mapping, then compute costs per §4.7. Returns `None` when the
/// model/mapping cannot be found or `promptTokens` is still unknown after estimation
/// (step 1/3: "all costs null").
#[must_use]
pub fn compute(catalog: &Catalog, model_id: &str, provider_id: &str, inputs: &CostInputs) -> Option<CostBreakdown> {
    let (_model, mapping) = catalog
        .model_by_id(model_id)
        .and_then(|m| m.providers.iter().find(|p| p.provider_id == provider_id).map(|m2| (m, m2)))
        .or_else(|| catalog.model_by_mapping_name(model_id, Some(provider_id)))?;

    let prompt_tokens = inputs.prompt_tokens?;

    let tier = select_tier(mapping, prompt_tokens);
    let (input_price, output_price, cached_input_price) = tier.map_or(
        (mapping.input_price, mapping.output_price, mapping.cached_input_price),
        |t| (t.input_price, t.output_price, t.cached_input_price.or(mapping.cached_input_price)),
    );

    let discount = mapping.discount;
    let one_minus_discount = Decimal::ONE - discount;

    let mut effective_prompt_tokens = Decimal::from(prompt_tokens);
    if mapping.image_input_price.is_some() && inputs.input_image_count > 0 {
        effective_prompt_tokens += Decimal::from(inputs.input_image_count * IMAGE_INPUT_TOKEN_EQUIVALENT);
    }

    let uncached_prompt = effective_prompt_tokens - Decimal::from(inputs.cached_tokens);
    let input_cost = uncached_prompt * input_price * one_minus_discount;

    let total_output_tokens = inputs.completion_tokens + inputs.reasoning_tokens;

    let (output_cost, image_output_cost) = if mapping.image_output_price.is_some() && inputs.output_image_count > 0 {
        let per_image_tokens = match inputs.image_size {
            Some(ImageSize::FourK) => IMAGE_OUTPUT_TOKENS_4K,
            _ => IMAGE_OUTPUT_TOKENS_STANDARD,
        };
        let image_tokens = inputs.output_image_count * per_image_tokens;
        let text_tokens = total_output_tokens.saturating_sub(image_tokens);
        let text_cost = Decimal::from(text_tokens) * output_price * one_minus_discount;
        let image_price = mapping.image_output_price.unwrap_or_default();
        let image_cost = Decimal::from(image_tokens) * image_price * one_minus_discount;
        (text_cost, image_cost)
    } else {
        (Decimal::from(total_output_tokens) * output_price * one_minus_discount, Decimal::ZERO)
    };

    let cached_input_cost = cached_input_price
        .map(|price| Decimal::from(inputs.cached_tokens) * price * one_minus_discount)
        .unwrap_or_default();

    let request_cost =
        mapping.request_price.map(|price| price * one_minus_discount).unwrap_or_default();

    let web_search_cost = mapping
        .web_search_price
        .map(|price| Decimal::from(inputs.web_search_count) * price * one_minus_discount)
        .unwrap_or_default();

    let total_cost =
        input_cost + output_cost + cached_input_cost + request_cost + image_output_cost + web_search_cost;

    Some(CostBreakdown {
        input_cost,
        output_cost,
        cached_input_cost,
        request_cost,
        image_input_cost: Decimal::ZERO,
        image_output_cost,
        web_search_cost,
        total_cost,
        pricing_tier: tier.map(|t| t.name.clone()),
        discount: (discount != Decimal::ZERO).then_some(discount),
        estimated_cost: false,
    })
}

fn select_tier(mapping: &Mapping, prompt_tokens: u64) -> Option<&gateway_catalog::PricingTier> {
    mapping.pricing_tiers.iter().find(|tier| prompt_tokens <= tier.up_to_tokens)
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_catalog::{Model, PricingTier, Provider, Stability};

    fn tiered_mapping() -> Mapping {
        Mapping {
            provider_id: "openai".into(),
            model_name: "gpt".into(),
            input_price: Decimal::new(2, 0),
            output_price: Decimal::new(6, 0),
            cached_input_price: None,
            image_input_price: None,
            image_output_price: None,
            request_price: None,
            web_search_price: None,
            pricing_tiers: vec![PricingTier {
                up_to_tokens: 200_000,
                input_price: Decimal::new(15, 1),
                output_price: Decimal::new(5, 0),
                cached_input_price: None,
                name: "tier-1".into(),
            }],
            context_size: None,
            max_output: None,
            streaming: true,
            vision: false,
            reasoning: false,
            tools: true,
            json_output: true,
            web_search: false,
            discount: Decimal::new(2, 1),
            stability: Stability::Stable,
            deprecated_at: None,
            deactivated_at: None,
        }
    }

    fn catalog_with(mapping: Mapping) -> Catalog {
        let model = Model {
            id: "gpt".into(),
            family: "gpt".into(),
            free: false,
            output: vec!["text".into()],
            stability: Stability::Stable,
            providers: vec![mapping],
        };
        Catalog::new(vec![Provider { id: "openai".into(), name: "openai".into(), priority: Decimal::ONE, streaming: None, cancellation: None }], vec![model])
    }

    #[test]
    fn scenario_3_tier_falls_back_to_base_above_threshold() {
        let catalog = catalog_with(tiered_mapping());
        let inputs = CostInputs {
            prompt_tokens: Some(250_000),
            completion_tokens: 1000,
            ..Default::default()
        };
        let breakdown = compute(&catalog, "gpt", "openai", &inputs).unwrap();
        assert_eq!(breakdown.input_cost, Decimal::new(250_000, 0) * Decimal::new(2, 0) * Decimal::new(8, 1));
        assert_eq!(breakdown.output_cost, Decimal::new(1000, 0) * Decimal::new(6, 0) * Decimal::new(8, 1));
    }

    #[test]
    fn missing_model_returns_none() {
        let catalog = catalog_with(tiered_mapping());
        let inputs = CostInputs { prompt_tokens: Some(100), ..Default::default() };
        assert!(compute(&catalog, "nonexistent", "openai", &inputs).is_none());
    }

    #[test]
    fn missing_prompt_tokens_returns_none() {
        let catalog = catalog_with(tiered_mapping());
        let inputs = CostInputs { prompt_tokens: None, ..Default::default() };
        assert!(compute(&catalog, "gpt", "openai", &inputs).is_none());
    }

    #[test]
    fn total_cost_is_sum_of_components() {
        let mut mapping = tiered_mapping();
        mapping.request_price = Some(Decimal::new(1, 2));
        mapping.web_search_price = Some(Decimal::new(5, 2));
        let catalog = catalog_with(mapping);
        let inputs = CostInputs {
            prompt_tokens: Some(100_000),
            completion_tokens: 500,
            web_search_count: 2,
            ..Default::default()
        };
        let breakdown = compute(&catalog, "gpt", "openai", &inputs).unwrap();
        let sum = breakdown.input_cost
            + breakdown.output_cost
            + breakdown.cached_input_cost
            + breakdown.request_cost
            + breakdown.web_search_cost;
        assert_eq!(breakdown.total_cost, sum);
    }

    #[test]
    fn zero_cached_tokens_means_zero_cached_cost() {
        let catalog = catalog_with(tiered_mapping());
        let inputs = CostInputs { prompt_tokens: Some(1000), cached_tokens: 0, ..Default::default() };
        let breakdown = compute(&catalog, "gpt", "openai", &inputs).unwrap();
        assert_eq!(breakdown.cached_input_cost, Decimal::ZERO);
    }

    #[test]
    fn discount_scales_cost_proportionally() {
        let mut discounted = tiered_mapping();
        discounted.discount = Decimal::new(3, 1);
        let mut undiscounted = tiered_mapping();
        undiscounted.discount = Decimal::ZERO;

        let inputs = CostInputs { prompt_tokens: Some(1000), completion_tokens: 200, ..Default::default() };
        let discounted_cost = compute(&catalog_with(discounted), "gpt", "openai", &inputs).unwrap().total_cost;
        let base_cost = compute(&catalog_with(undiscounted), "gpt", "openai", &inputs).unwrap().total_cost;

        assert_eq!(discounted_cost, base_cost * Decimal::new(7, 1));
    }

    #[test]
    fn estimate_tokens_is_nonzero_for_nonempty_text() {
        assert!(estimate_tokens("hello world") > 0);
        assert_eq!(estimate_tokens(""), 0);
    }

    #[test]
    fn reasoning_tokens_are_billed_as_output() {
        let catalog = catalog_with(tiered_mapping());
        let with_reasoning = CostInputs {
            prompt_tokens: Some(1000),
            completion_tokens: 100,
            reasoning_tokens: 50,
            ..Default::default()
        };
        let without_reasoning =
            CostInputs { prompt_tokens: Some(1000), completion_tokens: 150, ..Default::default() };
        let a = compute(&catalog, "gpt", "openai", &with_reasoning).unwrap();
        let b = compute(&catalog, "gpt", "openai", &without_reasoning).unwrap();
        assert_eq!(a.output_cost, b.output_cost);
    }
}
