//! Builds a [`RequestContext`] from the incoming request's headers, the way the
//! teacher's `request_context_middleware` assembles its context from extensions — except
//! this gateway has no upstream auth middleware populating those extensions, so identity
//! resolution happens here, against the configured [`IdentityResolver`].

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use gateway_core::{GatewayError, RequestContext, RequestMode};
use secrecy::SecretString;

use crate::error::ApiError;
use crate::AppState;

const AUTHORIZATION: &str = "authorization";
const BYOK_KEY_HEADER: &str = "x-llmgateway-key";
const NO_FALLBACK_HEADER: &str = "x-no-fallback";
const SOURCE_HEADER: &str = "x-source";

fn bearer_token(parts: &http::request::Parts) -> Option<&str> {
    parts.headers.get(AUTHORIZATION)?.to_str().ok()?.strip_prefix("Bearer ")
}

pub async fn request_context_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let (parts, body) = request.into_parts();

    let identity = bearer_token(&parts)
        .and_then(|key| state.identities.resolve(key))
        .ok_or(GatewayError::Unauthorized)?;

    let byok_key = parts
        .headers
        .get(BYOK_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|v| SecretString::from(v.to_owned()));

    let no_fallback =
        parts.headers.get(NO_FALLBACK_HEADER).and_then(|v| v.to_str().ok()).is_some_and(|v| v.eq_ignore_ascii_case("true"));

    let source = parts.headers.get(SOURCE_HEADER).and_then(|v| v.to_str().ok()).map(str::to_owned);

    // §4.8 step 1: BYOK requests validate under api-keys, everything else under credits.
    // Hybrid requires org-level configuration this gateway doesn't yet resolve identity against.
    let mode = if byok_key.is_some() { RequestMode::ApiKeys } else { RequestMode::Credits };

    let context = RequestContext { parts: parts.clone(), byok_key, identity, no_fallback, source, mode };

    let mut request = Request::from_parts(parts, body);
    request.extensions_mut().insert(context);

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_token_strips_prefix() {
        let (parts, ()) =
            http::Request::builder().header("authorization", "Bearer sk-test").body(()).unwrap().into_parts();
        assert_eq!(bearer_token(&parts), Some("sk-test"));
    }

    #[test]
    fn bearer_token_absent_without_header() {
        let (parts, ()) = http::Request::builder().body(()).unwrap().into_parts();
        assert_eq!(bearer_token(&parts), None);
    }
}
