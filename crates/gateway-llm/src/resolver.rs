//! C2 — Model Resolver: parses the caller's free-form model string against the
//! catalog into a `(requestedModel, requestedProvider?, customProviderName?)` triple.
//!
//! Grounded on `crates/synapse-llm/src/routing.rs` (`ModelRouter::resolve`) for the
//! general provider-prefix / alias-search shape, rewritten against
//! `gateway_catalog::Catalog` per SPEC_FULL.md §4.1's exact rules.

use gateway_catalog::Catalog;
use gateway_core::GatewayError;

/// Gateway sentinel provider for the `"auto"`/`"custom"` exact-value cases (§4.1 rule 1).
pub const GATEWAY_SENTINEL_PROVIDER: &str = "llmgateway";

/// Result of resolving a caller's `modelInput` string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedModel {
    pub requested_model: String,
    pub requested_provider: Option<String>,
    pub custom_provider_name: Option<String>,
}

/// Parse `model_input` against the catalog, per SPEC_FULL.md §4.1.
///
/// # Errors
///
/// Returns `GatewayError::BadRequest` for any parse failure (unsupported model,
/// provider/model mismatch, or an unprefixed provider-specific name).
pub fn resolve(catalog: &Catalog, model_input: &str) -> Result<ResolvedModel, GatewayError> {
    // Rule 1: exact sentinel values.
    if model_input == "auto" || model_input == "custom" {
        return Ok(ResolvedModel {
            requested_model: model_input.to_owned(),
            requested_provider: Some(GATEWAY_SENTINEL_PROVIDER.to_owned()),
            custom_provider_name: None,
        });
    }

    // Rule 2: explicit provider/model syntax.
    if let Some((head, tail)) = model_input.split_once('/') {
        return resolve_prefixed(catalog, head, tail);
    }

    // Rule 3: bare catalog model id, provider left to the Scorer.
    if catalog.model_by_id(model_input).is_some() {
        return Ok(ResolvedModel {
            requested_model: model_input.to_owned(),
            requested_provider: None,
            custom_provider_name: None,
        });
    }

    // Rule 4: matches a provider-specific mapping name but no prefix was given.
    if let Some((_, mapping)) = catalog.model_by_mapping_name(model_input, None) {
        return Err(GatewayError::BadRequest(format!(
            "\"{model_input}\" must be requested with a provider prefix. Use the format: {}/<rootModelId>",
            mapping.provider_id
        )));
    }

    // Rule 5.
    Err(GatewayError::BadRequest(format!("unsupported model: {model_input}")))
}

fn resolve_prefixed(catalog: &Catalog, head: &str, tail: &str) -> Result<ResolvedModel, GatewayError> {
    let Some(provider) = catalog.provider(head) else {
        // Unknown provider id: treat `head` as a custom provider name, `tail` verbatim,
        // no validation (§4.1 rule 2).
        return Ok(ResolvedModel {
            requested_model: tail.to_owned(),
            requested_provider: None,
            custom_provider_name: Some(head.to_owned()),
        });
    };

    // (a) `m.id == tail`
    if let Some(model) = catalog.model_by_id(tail) {
        let Some(mapping) = model.providers.iter().find(|m| m.provider_id == provider.id) else {
            return Err(GatewayError::BadRequest(format!(
                "provider \"{}\" does not support model \"{tail}\"",
                provider.id
            )));
        };
        return Ok(ResolvedModel {
            requested_model: model.id.clone(),
            requested_provider: Some(provider.id.clone()),
            custom_provider_name: None,
        });
    }

    // (b) `mapping.modelName == tail ∧ mapping.providerId == provider`
    if let Some((model, _)) = catalog.model_by_mapping_name(tail, Some(&provider.id)) {
        return Ok(ResolvedModel {
            requested_model: model.id.clone(),
            requested_provider: Some(provider.id.clone()),
            custom_provider_name: None,
        });
    }

    Err(GatewayError::BadRequest(format!("unsupported model: {head}/{tail}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_catalog::{Mapping, Model, Provider, Stability};
    use rust_decimal::Decimal;

    fn provider(id: &str) -> Provider {
        Provider { id: id.to_owned(), name: id.to_owned(), priority: Decimal::ONE, streaming: None, cancellation: None }
    }

    fn mapping(provider_id: &str, model_name: &str) -> Mapping {
        Mapping {
            provider_id: provider_id.to_owned(),
            model_name: model_name.to_owned(),
            input_price: Decimal::ONE,
            output_price: Decimal::ONE,
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

    fn catalog() -> Catalog {
        let anthropic = provider("anthropic");
        let together = provider("together.ai");
        let model = Model {
            id: "claude-3-5-sonnet-20241022".into(),
            family: "claude".into(),
            free: false,
            output: vec!["text".into()],
            stability: Stability::Stable,
            providers: vec![mapping("anthropic", "claude-3-5-sonnet-20241022")],
        };
        let llama = Model {
            id: "llama-3.1-8b".into(),
            family: "llama".into(),
            free: false,
            output: vec!["text".into()],
            stability: Stability::Stable,
            providers: vec![mapping("together.ai", "Meta-Llama-3.1-8B-Instruct-Turbo")],
        };
        Catalog::new(vec![anthropic, together], vec![model, llama])
    }

    #[test]
    fn scenario_1_known_prefix() {
        let resolved = resolve(&catalog(), "anthropic/claude-3-5-sonnet-20241022").unwrap();
        assert_eq!(resolved.requested_provider.as_deref(), Some("anthropic"));
        assert_eq!(resolved.requested_model, "claude-3-5-sonnet-20241022");
    }

    #[test]
    fn scenario_2_unprefixed_provider_specific_name_errors() {
        let err = resolve(&catalog(), "Meta-Llama-3.1-8B-Instruct-Turbo").unwrap_err();
        let message = err.to_string();
        assert!(message.contains("must be requested with a provider prefix"));
        assert!(message.contains("together.ai/<rootModelId>"));
    }

    #[test]
    fn auto_and_custom_are_sentinels() {
        let resolved = resolve(&catalog(), "auto").unwrap();
        assert_eq!(resolved.requested_provider.as_deref(), Some(GATEWAY_SENTINEL_PROVIDER));
        assert_eq!(resolved.requested_model, "auto");
    }

    #[test]
    fn unknown_provider_prefix_is_custom() {
        let resolved = resolve(&catalog(), "my-proxy/some-model").unwrap();
        assert_eq!(resolved.custom_provider_name.as_deref(), Some("my-proxy"));
        assert_eq!(resolved.requested_model, "some-model");
        assert!(resolved.requested_provider.is_none());
    }

    #[test]
    fn bare_model_id_defers_provider_to_scorer() {
        let resolved = resolve(&catalog(), "claude-3-5-sonnet-20241022").unwrap();
        assert!(resolved.requested_provider.is_none());
    }

    #[test]
    fn known_provider_unsupported_model_errors() {
        let err = resolve(&catalog(), "anthropic/llama-3.1-8b").unwrap_err();
        assert!(err.to_string().contains("unsupported model"));
    }

    #[test]
    fn known_provider_model_id_not_offered_by_that_provider() {
        let err = resolve(&catalog(), "together.ai/claude-3-5-sonnet-20241022").unwrap_err();
        assert!(err.to_string().contains("does not support model"));
    }

    #[test]
    fn fully_unknown_model_errors() {
        let err = resolve(&catalog(), "totally-unknown-model").unwrap_err();
        assert!(err.to_string().contains("unsupported model"));
    }
}
