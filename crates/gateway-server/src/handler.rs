//! Axum route handlers for the OpenAI-compatible and Anthropic-compatible surfaces.
//!
//! Grounded on `crates/synapse-llm/src/handler.rs`.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router, routing};
use gateway_core::RequestContext;
use gateway_llm::convert::model_list::{model_list_to_wire, ModelListQuery};
use gateway_llm::protocol::anthropic::{AnthropicRequest, AnthropicResponse};
use gateway_llm::protocol::openai::{OpenAiRequest, OpenAiResponse};
use gateway_llm::types::CompletionRequest;

use crate::error::ApiError;
use crate::streaming::{anthropic_stream_response, openai_stream_response};
use crate::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/chat/completions", routing::post(chat_completions))
        .route("/v1/models", routing::get(list_models))
        .route("/v1/messages", routing::post(anthropic_messages))
        .with_state(state)
}

fn now_unix() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or_default()
}

async fn chat_completions(
    State(state): State<Arc<AppState>>,
    axum::Extension(ctx): axum::Extension<RequestContext>,
    Json(wire_request): Json<OpenAiRequest>,
) -> Result<Response, ApiError> {
    let is_stream = wire_request.stream.unwrap_or(false);
    let request: CompletionRequest = wire_request.into();

    if is_stream {
        let (_provider, model, stream) = state.dispatcher.complete_stream(request, &ctx).await?;
        let response_id = format!("chatcmpl-{}", uuid::Uuid::new_v4());
        Ok(openai_stream_response(stream, response_id, model).into_response())
    } else {
        let response = state.dispatcher.complete(request, &ctx).await?;
        let wire_response: OpenAiResponse = response.into();
        Ok(Json(wire_response).into_response())
    }
}

async fn list_models(State(state): State<Arc<AppState>>, Query(query): Query<ModelListQuery>) -> Response {
    let created = now_unix();
    let body = model_list_to_wire(&state.catalog, &query, created, chrono::Utc::now());
    Json(body).into_response()
}

async fn anthropic_messages(
    State(state): State<Arc<AppState>>,
    axum::Extension(ctx): axum::Extension<RequestContext>,
    Json(wire_request): Json<AnthropicRequest>,
) -> Result<Response, ApiError> {
    let is_stream = wire_request.stream.unwrap_or(false);
    let request: CompletionRequest = wire_request.into();

    if is_stream {
        let (_provider, model, stream) = state.dispatcher.complete_stream(request, &ctx).await?;
        let response_id = format!("msg_{}", uuid::Uuid::new_v4());
        Ok(anthropic_stream_response(stream, response_id, model).into_response())
    } else {
        let response = state.dispatcher.complete(request, &ctx).await?;
        let wire_response: AnthropicResponse = response.into();
        Ok(Json(wire_response).into_response())
    }
}
