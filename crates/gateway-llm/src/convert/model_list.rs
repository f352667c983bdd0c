//! Flattens the catalog's `Model`/`Mapping` shape into the `GET /v1/models` wire
//! response §6 documents. Grounded on `convert::image_gen`'s plain free-function shape
//! (no `From` impl since this needs the whole `Catalog`, not one wire struct).

use chrono::{DateTime, Utc};
use gateway_catalog::{Catalog, Mapping, Model, Stability};

use crate::protocol::openai::{OpenAiModel, OpenAiModelArchitecture, OpenAiModelList, OpenAiModelPricing, OpenAiModelProvider};

/// `GET /v1/models` query parameters (§6).
#[derive(Debug, Clone, Copy, Default, serde::Deserialize)]
pub struct ModelListQuery {
    #[serde(default)]
    pub include_deactivated: bool,
    #[serde(default)]
    pub exclude_deprecated: bool,
}

fn stability_str(stability: Stability) -> &'static str {
    match stability {
        Stability::Stable => "stable",
        Stability::Beta => "beta",
        Stability::Unstable => "unstable",
        Stability::Experimental => "experimental",
    }
}

fn is_deprecated(mapping: &Mapping, now: DateTime<Utc>) -> bool {
    mapping.deprecated_at.is_some_and(|at| now >= at)
}

/// The mappings of `model` that survive the query's filters (§6: "a model is only
/// excluded when all its providers are deprecated/deactivated").
fn visible_mappings<'a>(model: &'a Model, query: &ModelListQuery, now: DateTime<Utc>) -> Vec<&'a Mapping> {
    model
        .providers
        .iter()
        .filter(|mapping| query.include_deactivated || mapping.is_available(now))
        .filter(|mapping| !query.exclude_deprecated || !is_deprecated(mapping, now))
        .collect()
}

/// Build the `GET /v1/models` response body.
#[must_use]
pub fn model_list_to_wire(catalog: &Catalog, query: &ModelListQuery, created: u64, now: DateTime<Utc>) -> OpenAiModelList {
    let data = catalog.models().iter().filter_map(|model| model_to_wire(catalog, model, query, created, now)).collect();
    OpenAiModelList { object: "list".to_owned(), data }
}

fn model_to_wire(catalog: &Catalog, model: &Model, query: &ModelListQuery, created: u64, now: DateTime<Utc>) -> Option<OpenAiModel> {
    let visible = visible_mappings(model, query, now);
    let top = *visible
        .iter()
        .max_by_key(|mapping| catalog.provider(&mapping.provider_id).map_or(rust_decimal::Decimal::ONE, |p| p.priority))?;

    let providers = visible
        .iter()
        .map(|mapping| OpenAiModelProvider {
            id: mapping.provider_id.clone(),
            model_name: mapping.model_name.clone(),
            pricing: OpenAiModelPricing { prompt: mapping.input_price, completion: mapping.output_price },
            stability: stability_str(mapping.stability).to_owned(),
            deprecated_at: mapping.deprecated_at,
            deactivated_at: mapping.deactivated_at,
        })
        .collect();

    let input_modalities = if visible.iter().any(|mapping| mapping.vision) {
        vec!["text".to_owned(), "image".to_owned()]
    } else {
        vec!["text".to_owned()]
    };

    Some(OpenAiModel {
        id: model.id.clone(),
        name: model.id.clone(),
        created,
        architecture: OpenAiModelArchitecture { input_modalities, output_modalities: model.output.clone() },
        top_provider: top.provider_id.clone(),
        providers,
        pricing: OpenAiModelPricing { prompt: top.input_price, completion: top.output_price },
        family: model.family.clone(),
        json_output: visible.iter().any(|mapping| mapping.json_output),
        structured_outputs: visible.iter().any(|mapping| mapping.json_output),
        stability: Some(stability_str(model.stability).to_owned()),
        deprecated_at: None,
        deactivated_at: None,
    })
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use gateway_catalog::Provider;
    use rust_decimal::Decimal;

    use super::*;

    fn mapping(provider_id: &str, deprecated_at: Option<DateTime<Utc>>, deactivated_at: Option<DateTime<Utc>>) -> Mapping {
        Mapping {
            provider_id: provider_id.to_owned(),
            model_name: format!("{provider_id}-model"),
            input_price: Decimal::ONE,
            output_price: Decimal::new(2, 0),
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
            deprecated_at,
            deactivated_at,
        }
    }

    fn catalog_with(model: Model) -> Catalog {
        Catalog::new(
            vec![Provider { id: "a".into(), name: "a".into(), priority: Decimal::ONE, streaming: None, cancellation: None }],
            vec![model],
        )
    }

    #[test]
    fn model_excluded_only_when_every_provider_is_deactivated() {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let past = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let model = Model {
            id: "m1".into(),
            family: "f".into(),
            free: false,
            output: vec!["text".into()],
            stability: Stability::Stable,
            providers: vec![mapping("a", None, Some(past))],
        };
        let catalog = catalog_with(model);
        let list = model_list_to_wire(&catalog, &ModelListQuery::default(), 0, now);
        assert!(list.data.is_empty());
    }

    #[test]
    fn model_kept_when_one_of_several_providers_is_still_active() {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let past = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let model = Model {
            id: "m1".into(),
            family: "f".into(),
            free: false,
            output: vec!["text".into()],
            stability: Stability::Stable,
            providers: vec![mapping("a", None, Some(past)), mapping("b", None, None)],
        };
        let catalog = catalog_with(model);
        let list = model_list_to_wire(&catalog, &ModelListQuery::default(), 0, now);
        assert_eq!(list.data.len(), 1);
        assert_eq!(list.data[0].providers.len(), 1);
        assert_eq!(list.data[0].providers[0].id, "b");
    }

    #[test]
    fn include_deactivated_restores_the_excluded_provider() {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let past = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let model = Model {
            id: "m1".into(),
            family: "f".into(),
            free: false,
            output: vec!["text".into()],
            stability: Stability::Stable,
            providers: vec![mapping("a", None, Some(past))],
        };
        let catalog = catalog_with(model);
        let query = ModelListQuery { include_deactivated: true, exclude_deprecated: false };
        let list = model_list_to_wire(&catalog, &query, 0, now);
        assert_eq!(list.data.len(), 1);
        assert_eq!(list.data[0].providers.len(), 1);
    }

    #[test]
    fn exclude_deprecated_drops_deprecated_providers() {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let past = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let model = Model {
            id: "m1".into(),
            family: "f".into(),
            free: false,
            output: vec!["text".into()],
            stability: Stability::Stable,
            providers: vec![mapping("a", Some(past), None), mapping("b", None, None)],
        };
        let catalog = catalog_with(model);
        let query = ModelListQuery { include_deactivated: false, exclude_deprecated: true };
        let list = model_list_to_wire(&catalog, &query, 0, now);
        assert_eq!(list.data[0].providers.len(), 1);
        assert_eq!(list.data[0].providers[0].id, "b");
    }
}
