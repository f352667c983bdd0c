//! TOML config loading, `{{ env.VAR }}` expansion, and the catalog/provider/api-key
//! sections that feed the gateway's startup. Grounded on `crates/synapse-config`'s
//! `lib.rs`/`env.rs`/`loader.rs`, generalized per SPEC_FULL.md §2/§3/§6.

pub mod api_keys;
pub mod billing;
pub mod catalog;
pub mod database;
pub mod env;
pub mod identity;
mod loader;
pub mod providers;
pub mod server;
pub mod stats;

use serde::Deserialize;

pub use api_keys::EnvApiKeySource;
pub use billing::BillingConfig;
pub use catalog::CatalogConfig;
pub use identity::{ApiKeyEntry, IdentityResolver, StaticIdentityTable};
pub use providers::{ProviderEndpointConfig, ProviderProtocol, ProvidersConfig};
pub use server::ServerConfig;
pub use stats::{RetentionConfig, StatsConfig};

/// Top-level gateway configuration, loaded from a TOML file (§2 "Config loader").
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub identities: StaticIdentityTable,
    #[serde(default)]
    pub billing: BillingConfig,
    #[serde(default)]
    pub stats: StatsConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
}
