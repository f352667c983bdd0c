//! Maps `GatewayError` (via the `HttpError` trait) onto an axum `Response`, the way the
//! teacher's route handlers translate `synapse-core` errors at the HTTP boundary.

use axum::Json;
use axum::response::{IntoResponse, Response};
use gateway_core::{GatewayError, HttpError};
use serde_json::json;

pub struct ApiError(pub GatewayError);

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.0.status_code();
        let body = Json(json!({
            "error": {
                "message": self.0.client_message(),
                "type": self.0.error_type(),
            }
        }));
        (status, body).into_response()
    }
}
