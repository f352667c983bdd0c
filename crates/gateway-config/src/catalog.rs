//! Catalog config section: `[[catalog.providers]]` / `[[catalog.models]]` TOML tables
//! deserialize directly into `gateway_catalog::{Provider, Model}` (§3, §9 "consumed as a
//! read-only data source" — population/administration is out of scope, only consumption).

use gateway_catalog::{Catalog, Model, Provider};
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CatalogConfig {
    #[serde(default)]
    pub providers: Vec<Provider>,
    #[serde(default)]
    pub models: Vec<Model>,
}

impl CatalogConfig {
    #[must_use]
    pub fn into_catalog(self) -> Catalog {
        Catalog::new(self.providers, self.models)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_providers_and_models() {
        let toml = r#"
            [[providers]]
            id = "anthropic"
            name = "Anthropic"

            [[models]]
            id = "claude-3-5-sonnet-20241022"
            family = "claude"
            output = ["text"]
            stability = "stable"

            [[models.providers]]
            providerId = "anthropic"
            modelName = "claude-3-5-sonnet-20241022"
            input_price = "3.0"
            output_price = "15.0"
            stability = "stable"
        "#;

        let config: CatalogConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.providers.len(), 1);
        assert_eq!(config.models.len(), 1);
        let catalog = config.into_catalog();
        assert!(catalog.model_by_id("claude-3-5-sonnet-20241022").is_some());
    }
}
