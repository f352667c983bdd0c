use http::StatusCode;
use thiserror::Error;

/// Trait for domain errors that can be converted to HTTP responses.
///
/// The server layer converts these into actual HTTP responses, keeping
/// domain errors decoupled from axum.
pub trait HttpError: std::error::Error {
    /// HTTP status code for this error.
    fn status_code(&self) -> StatusCode;

    /// Machine-readable error type (e.g. `invalid_request_error`).
    fn error_type(&self) -> &str;

    /// Message safe to expose to API consumers.
    fn client_message(&self) -> String;
}

/// Errors produced anywhere in the request lifecycle: resolution, health
/// filtering, scoring, dispatch, and response parsing.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Malformed input, unknown model, unsupported parameter combination. Never retried.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Auth at the gateway boundary.
    #[error("authentication required")]
    Unauthorized,

    /// Auth at the gateway boundary.
    #[error("forbidden")]
    Forbidden,

    /// Client error reported by upstream; surfaced as-is.
    #[error("upstream client error ({status}): {body}")]
    Upstream4xx { status: u16, body: String },

    /// Server error, transport failure, or timeout from upstream.
    #[error("upstream server error ({status}): {body}")]
    Upstream5xx { status: u16, body: String },

    /// Unclassified internal failure. Does NOT advance a key's consecutive-error counter.
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),

    /// Client disconnected mid-request.
    #[error("request canceled")]
    Canceled,
}

impl GatewayError {
    /// Whether a failover retry against the next candidate mapping is worth attempting.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Upstream4xx { .. } | Self::Upstream5xx { .. })
    }

    /// The unified finish reason a log record should carry for this error.
    #[must_use]
    pub const fn unified_finish_reason(&self) -> UnifiedFinishReason {
        match self {
            Self::BadRequest(_) | Self::Unauthorized | Self::Forbidden => UnifiedFinishReason::ClientError,
            Self::Upstream4xx { .. } => UnifiedFinishReason::ClientError,
            Self::Upstream5xx { .. } => UnifiedFinishReason::UpstreamError,
            Self::Internal(_) => UnifiedFinishReason::GatewayError,
            Self::Canceled => UnifiedFinishReason::Canceled,
        }
    }

    /// Status ∈ {401, 403} marks the upstream key as permanently blacklisted (§4.2, §7).
    #[must_use]
    pub const fn is_permanent_auth_failure(&self) -> bool {
        matches!(self, Self::Upstream4xx { status: 401 | 403, .. })
    }
}

impl HttpError for GatewayError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::Upstream4xx { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_REQUEST)
            }
            Self::Upstream5xx { .. } | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Canceled => StatusCode::from_u16(499).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        }
    }

    fn error_type(&self) -> &str {
        match self {
            Self::BadRequest(_) => "invalid_request_error",
            Self::Unauthorized => "authentication_error",
            Self::Forbidden => "permission_error",
            Self::Upstream4xx { .. } | Self::Upstream5xx { .. } => "upstream_error",
            Self::Internal(_) => "internal_error",
            Self::Canceled => "canceled_error",
        }
    }

    fn client_message(&self) -> String {
        match self {
            Self::Internal(_) => "an internal error occurred".to_owned(),
            other => other.to_string(),
        }
    }
}

/// The taxonomy a log record's `unifiedFinishReason` is drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnifiedFinishReason {
    Completed,
    LengthLimit,
    ContentFilter,
    ToolCalls,
    Incomplete,
    GatewayError,
    UpstreamError,
    ClientError,
    Canceled,
    Unknown,
}

impl std::fmt::Display for UnifiedFinishReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Completed => "completed",
            Self::LengthLimit => "length_limit",
            Self::ContentFilter => "content_filter",
            Self::ToolCalls => "tool_calls",
            Self::Incomplete => "incomplete",
            Self::GatewayError => "gateway_error",
            Self::UpstreamError => "upstream_error",
            Self::ClientError => "client_error",
            Self::Canceled => "canceled",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upstream_4xx_is_retryable() {
        let err = GatewayError::Upstream4xx { status: 429, body: String::new() };
        assert!(err.is_retryable());
    }

    #[test]
    fn bad_request_is_not_retryable() {
        let err = GatewayError::BadRequest("bad".into());
        assert!(!err.is_retryable());
    }

    #[test]
    fn auth_failure_statuses_permanently_blacklist() {
        assert!(GatewayError::Upstream4xx { status: 401, body: String::new() }.is_permanent_auth_failure());
        assert!(GatewayError::Upstream4xx { status: 403, body: String::new() }.is_permanent_auth_failure());
        assert!(!GatewayError::Upstream4xx { status: 400, body: String::new() }.is_permanent_auth_failure());
    }

    #[test]
    fn internal_error_does_not_leak_details() {
        let err = GatewayError::Internal(anyhow::anyhow!("db connection string leaked"));
        assert_eq!(err.client_message(), "an internal error occurred");
    }
}
