//! Upstream provider API keys, read directly from the process environment (§2, §6):
//! `<PROVIDER>_API_KEY` as a comma-separated list, one `keyIndex` per entry, kept out of
//! the checked-in TOML file the way the teacher keeps `SecretString` provider keys out
//! of config.

use std::collections::HashMap;

use gateway_catalog::Catalog;
use gateway_llm::{ApiKey, ApiKeySource};
use secrecy::SecretString;

/// Builds the env var name a provider's keys are read from: `OPENAI_API_KEY`,
/// `TOGETHER_AI_API_KEY`, etc. — the provider id upper-cased with non-alphanumerics
/// collapsed to `_`.
#[must_use]
pub fn env_var_name(provider_id: &str) -> String {
    let mut name: String = provider_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
        .collect();
    name.push_str("_API_KEY");
    name
}

/// Static table of configured upstream keys, loaded once at startup from the
/// environment for every provider id present in the catalog.
#[derive(Debug, Default)]
pub struct EnvApiKeySource {
    keys: HashMap<String, Vec<ApiKey>>,
}

impl EnvApiKeySource {
    /// Read `<PROVIDER>_API_KEY` for every provider id in `catalog`.
    #[must_use]
    pub fn from_catalog(catalog: &Catalog) -> Self {
        let mut keys = HashMap::new();
        for provider in catalog.providers() {
            let env_var = env_var_name(&provider.id);
            let loaded = load_keys(&env_var);
            if !loaded.is_empty() {
                keys.insert(provider.id.clone(), loaded);
            }
        }
        Self { keys }
    }
}

fn load_keys(env_var: &str) -> Vec<ApiKey> {
    let Ok(raw) = std::env::var(env_var) else {
        return Vec::new();
    };

    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .enumerate()
        .map(|(index, secret)| ApiKey {
            env_var: env_var.to_owned(),
            index: u32::try_from(index).unwrap_or(u32::MAX),
            secret: SecretString::from(secret.to_owned()),
        })
        .collect()
}

impl ApiKeySource for EnvApiKeySource {
    fn keys_for(&self, provider_id: &str) -> &[ApiKey] {
        self.keys.get(provider_id).map_or(&[], Vec::as_slice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_var_name_upper_cases_and_collapses_dots() {
        assert_eq!(env_var_name("together.ai"), "TOGETHER_AI_API_KEY");
        assert_eq!(env_var_name("openai"), "OPENAI_API_KEY");
    }

    #[test]
    fn load_keys_splits_comma_separated_list() {
        temp_env::with_var("TEST_PROVIDER_API_KEY", Some("sk-one, sk-two"), || {
            let keys = load_keys("TEST_PROVIDER_API_KEY");
            assert_eq!(keys.len(), 2);
            assert_eq!(keys[0].index, 0);
            assert_eq!(keys[1].index, 1);
        });
    }

    #[test]
    fn missing_env_var_yields_no_keys() {
        temp_env::with_var_unset("MISSING_PROVIDER_API_KEY", || {
            assert!(load_keys("MISSING_PROVIDER_API_KEY").is_empty());
        });
    }
}
