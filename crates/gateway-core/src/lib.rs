//! Shared error types and request context for the gateway.

mod context;
mod error;

pub use context::{Identity, RequestContext, RequestMode};
pub use error::{GatewayError, HttpError, UnifiedFinishReason};
