use secrecy::SecretString;
use uuid::Uuid;

/// Billing/auth mode a request was validated under (§4.8 step 1), distinct from
/// [`gateway_llm::LogRecord::used_byok`]'s actual-key-used outcome: `mode` is what the
/// caller's API key is authorized for, `usedMode` is what this particular request billed
/// against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RequestMode {
    ApiKeys,
    Credits,
    Hybrid,
}

impl std::fmt::Display for RequestMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::ApiKeys => "api-keys",
            Self::Credits => "credits",
            Self::Hybrid => "hybrid",
        })
    }
}

/// Runtime context for a single gateway request.
///
/// Carries the caller's pre-authenticated identity (attribution for logging
/// and billing — authenticating the caller is an external collaborator's
/// job, not this crate's) plus the request-scoped headers the dispatcher
/// consults (`X-LLMGateway-Key`, `X-No-Fallback`, `X-Source`).
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// HTTP request parts (method, URI, headers, extensions).
    pub parts: http::request::Parts,
    /// Caller-supplied API key that overrides the configured upstream key (BYOK).
    pub byok_key: Option<SecretString>,
    /// Attributed identity for logging/billing.
    pub identity: Identity,
    /// `X-No-Fallback: true` — disables automatic retry to the next candidate.
    pub no_fallback: bool,
    /// `X-Source` header, logged verbatim.
    pub source: Option<String>,
    /// Mode the api key was validated under (§4.8 step 1); logged verbatim as `mode`.
    pub mode: RequestMode,
}

impl RequestContext {
    /// Minimal context for non-HTTP (e.g. test) use.
    #[must_use]
    pub fn empty() -> Self {
        let (parts, ()) = http::Request::builder()
            .method(http::Method::POST)
            .uri("/")
            .body(())
            .expect("valid minimal request")
            .into_parts();

        Self {
            parts,
            byok_key: None,
            identity: Identity::default(),
            no_fallback: false,
            source: None,
            mode: RequestMode::Credits,
        }
    }

    #[must_use]
    pub fn headers(&self) -> &http::HeaderMap {
        &self.parts.headers
    }
}

/// Organization/project/API-key attribution carried onto every log record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Identity {
    pub organization_id: Uuid,
    pub project_id: Uuid,
    pub api_key_id: Uuid,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_context_has_no_byok_key_or_fallback_override() {
        let ctx = RequestContext::empty();
        assert!(ctx.byok_key.is_none());
        assert!(!ctx.no_fallback);
        assert!(ctx.headers().is_empty());
    }
}
