//! Minimal API-key → `Identity` attribution (§1 "minimal API-key identity needed for
//! routing and logging" — full end-user auth/session management is an external
//! collaborator's job). Grounded on the shape of `synapse-auth::ResolvedKey`, trimmed
//! to the three attribution fields the dispatcher's log record actually needs.

use gateway_core::Identity;
use serde::Deserialize;
use std::collections::HashMap;
use uuid::Uuid;

/// Resolves a caller-presented API key to the identity attributed on its log records.
pub trait IdentityResolver: Send + Sync {
    fn resolve(&self, api_key: &str) -> Option<Identity>;
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApiKeyEntry {
    pub organization_id: Uuid,
    pub project_id: Uuid,
    pub api_key_id: Uuid,
}

/// `[api_keys.<key>]` table: a static, config-file-driven key → identity table.
///
/// Stands in for the external identity service named in §1; suitable for
/// self-hosted/dev deployments that don't run one.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct StaticIdentityTable(HashMap<String, ApiKeyEntry>);

impl IdentityResolver for StaticIdentityTable {
    fn resolve(&self, api_key: &str) -> Option<Identity> {
        self.0.get(api_key).map(|entry| Identity {
            organization_id: entry.organization_id,
            project_id: entry.project_id,
            api_key_id: entry.api_key_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_known_key_and_rejects_unknown() {
        let toml = r#"
            [sk-test-123]
            organization_id = "00000000-0000-0000-0000-000000000001"
            project_id = "00000000-0000-0000-0000-000000000002"
            api_key_id = "00000000-0000-0000-0000-000000000003"
        "#;
        let table: StaticIdentityTable = toml::from_str(toml).unwrap();
        assert!(table.resolve("sk-test-123").is_some());
        assert!(table.resolve("sk-unknown").is_none());
    }
}
