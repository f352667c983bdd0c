use std::path::Path;

use crate::Config;

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// Reads the file, expands `{{ env.VAR }}` placeholders, then deserializes and
    /// validates the result.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, environment variable expansion
    /// fails, TOML parsing fails, or validation fails.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read config file {}: {e}", path.display()))?;

        let expanded =
            crate::env::expand_env(&raw).map_err(|e| anyhow::anyhow!("config variable expansion failed: {e}"))?;

        let config: Self = toml::from_str(&expanded).map_err(|e| anyhow::anyhow!("failed to parse config: {e}"))?;

        config.validate()?;

        Ok(config)
    }

    /// Validate that the configuration is internally consistent.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog references an unknown provider, a `providers`
    /// entry has no matching catalog provider, or the BYOK fee is out of range.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.validate_catalog()?;
        self.validate_billing()?;
        Ok(())
    }

    fn validate_catalog(&self) -> anyhow::Result<()> {
        for model in &self.catalog.models {
            for mapping in &model.providers {
                if !self.catalog.providers.iter().any(|p| p.id == mapping.provider_id) {
                    anyhow::bail!(
                        "model '{}' maps to unknown provider '{}'",
                        model.id,
                        mapping.provider_id
                    );
                }
            }
        }
        Ok(())
    }

    fn validate_billing(&self) -> anyhow::Result<()> {
        if !(0.0..1.0).contains(&self.billing.byok_fee_percentage) {
            anyhow::bail!("billing.byok_fee_percentage must be in [0, 1)");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_accepts_empty_config() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_dangling_provider_reference() {
        let toml = r#"
            [catalog]
            [[catalog.models]]
            id = "m1"
            family = "f"
            output = ["text"]
            stability = "stable"

            [[catalog.models.providers]]
            providerId = "ghost"
            modelName = "m1"
            input_price = "1.0"
            output_price = "1.0"
            stability = "stable"
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_out_of_range_byok_fee() {
        let toml = r#"
            [billing]
            byok_fee_percentage = 1.5
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert!(config.validate().is_err());
    }
}
