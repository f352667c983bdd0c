//! The read-only catalog of providers, models, and (model, provider) mappings.
//!
//! Grounded on `crates/synapse-config/src/llm.rs` (`LlmProviderConfig`/`ModelConfig`
//! shape) generalized to the richer pricing/stability fields SPEC_FULL.md §3 requires.
//! The catalog is loaded once at startup by `gateway-config` and held for the process
//! lifetime — it is never mutated (§3 "Catalog is owned by config (read-only reference)").

mod types;

pub use types::{Mapping, Model, PricingTier, Provider, Stability};

use std::collections::HashMap;

/// The full catalog: every known provider and model.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    providers: HashMap<String, Provider>,
    models: Vec<Model>,
}

impl Catalog {
    #[must_use]
    pub fn new(providers: Vec<Provider>, models: Vec<Model>) -> Self {
        Self {
            providers: providers.into_iter().map(|p| (p.id.clone(), p)).collect(),
            models,
        }
    }

    #[must_use]
    pub fn provider(&self, id: &str) -> Option<&Provider> {
        self.providers.get(id)
    }

    #[must_use]
    pub fn providers(&self) -> impl Iterator<Item = &Provider> {
        self.providers.values()
    }

    #[must_use]
    pub fn models(&self) -> &[Model] {
        &self.models
    }

    /// Find a model by its canonical id.
    #[must_use]
    pub fn model_by_id(&self, id: &str) -> Option<&Model> {
        self.models.iter().find(|m| m.id == id)
    }

    /// Find a model that has a mapping with the given provider-specific `modelName`,
    /// optionally constrained to one provider.
    #[must_use]
    pub fn model_by_mapping_name(&self, model_name: &str, provider_id: Option<&str>) -> Option<(&Model, &Mapping)> {
        self.models.iter().find_map(|m| {
            let mapping = m.providers.iter().find(|mapping| {
                mapping.model_name == model_name && provider_id.is_none_or(|p| mapping.provider_id == p)
            })?;
            Some((m, mapping))
        })
    }

    /// All `(model, mapping)` pairs for the given model id that are currently available
    /// (§3 invariant: `now < deactivatedAt ∨ deactivatedAt = ⊥`) and not `unstable`/`experimental`
    /// at either the model or the mapping level.
    #[must_use]
    pub fn available_mappings<'a>(&'a self, model_id: &str, now: chrono::DateTime<chrono::Utc>) -> Vec<&'a Mapping> {
        let Some(model) = self.model_by_id(model_id) else {
            return Vec::new();
        };
        if matches!(model.stability, Stability::Unstable | Stability::Experimental) {
            return Vec::new();
        }
        model
            .providers
            .iter()
            .filter(|mapping| mapping.is_available(now))
            .filter(|mapping| !matches!(mapping.stability, Stability::Unstable | Stability::Experimental))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn mapping(provider_id: &str, deactivated: Option<chrono::DateTime<Utc>>) -> Mapping {
        Mapping {
            provider_id: provider_id.to_owned(),
            model_name: format!("{provider_id}-model"),
            input_price: rust_decimal::Decimal::new(2, 0),
            output_price: rust_decimal::Decimal::new(6, 0),
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
            discount: rust_decimal::Decimal::ZERO,
            stability: Stability::Stable,
            deprecated_at: None,
            deactivated_at: deactivated,
        }
    }

    #[test]
    fn available_mappings_excludes_deactivated() {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let past = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let model = Model {
            id: "m1".into(),
            family: "family".into(),
            free: false,
            output: vec!["text".into()],
            stability: Stability::Stable,
            providers: vec![mapping("a", None), mapping("b", Some(past))],
        };
        let catalog = Catalog::new(vec![], vec![model]);
        let available = catalog.available_mappings("m1", now);
        assert_eq!(available.len(), 1);
        assert_eq!(available[0].provider_id, "a");
    }

    #[test]
    fn available_mappings_excludes_unstable() {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let mut unstable = mapping("a", None);
        unstable.stability = Stability::Unstable;
        let model = Model {
            id: "m1".into(),
            family: "family".into(),
            free: false,
            output: vec!["text".into()],
            stability: Stability::Stable,
            providers: vec![unstable, mapping("b", None)],
        };
        let catalog = Catalog::new(vec![], vec![model]);
        let available = catalog.available_mappings("m1", now);
        assert_eq!(available.len(), 1);
        assert_eq!(available[0].provider_id, "b");
    }

    #[test]
    fn available_mappings_excludes_experimental_model_regardless_of_mapping_stability() {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let model = Model {
            id: "m1".into(),
            family: "family".into(),
            free: false,
            output: vec!["text".into()],
            stability: Stability::Experimental,
            providers: vec![mapping("a", None)],
        };
        let catalog = Catalog::new(vec![], vec![model]);
        assert!(catalog.available_mappings("m1", now).is_empty());
    }

    #[test]
    fn model_by_mapping_name_respects_provider_filter() {
        let model = Model {
            id: "m1".into(),
            family: "family".into(),
            free: false,
            output: vec!["text".into()],
            stability: Stability::Stable,
            providers: vec![mapping("together.ai", None)],
        };
        let catalog = Catalog::new(vec![], vec![model]);
        assert!(catalog.model_by_mapping_name("together.ai-model", Some("together.ai")).is_some());
        assert!(catalog.model_by_mapping_name("together.ai-model", Some("openai")).is_none());
    }
}
