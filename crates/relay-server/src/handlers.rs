//! HTTP request handlers for the gateway API.

use axum::{
    extract::{Query, State},
    response::{IntoResponse, Response},
    Json,
};
use relay_core::{ChatRequest, Dialect};
use relay_transform::{
    chat_chunk_to_response_chunk, chat_response_to_messages, chat_response_to_responses,
    messages_request_to_chat, responses_request_to_chat, AnthropicMessagesRequest,
    ResponsesRequest,
};
use serde::Serialize;
use serde_json::json;
use tracing::instrument;

use crate::{
    dispatch::{admit, dispatch, DispatchOutcome},
    error::ApiError,
    extractors::{BearerKey, JsonBody, RequestId, SessionQuery},
    state::AppState,
    stream::sse_response,
};

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status
    pub status: String,
    /// Version
    pub version: String,
}

/// Health check endpoint
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// List models endpoint (catalog snapshot union)
pub async fn list_models(State(state): State<AppState>) -> Json<serde_json::Value> {
    let data: Vec<serde_json::Value> = state
        .catalogs
        .all_models()
        .into_iter()
        .map(|id| json!({"id": id, "object": "model", "owned_by": "system"}))
        .collect();
    Json(json!({"object": "list", "data": data}))
}

/// OpenAI chat completions endpoint
#[instrument(skip(state, body), fields(model = %body.model))]
pub async fn chat_completions(
    State(state): State<AppState>,
    BearerKey(api_key): BearerKey,
    RequestId(request_id): RequestId,
    Query(query): Query<SessionQuery>,
    JsonBody(body): JsonBody<ChatRequest>,
) -> Result<Response, ApiError> {
    let admitted = admit(&state, request_id, api_key, &body, Dialect::Chat).await?;

    match dispatch(&state, admitted, body, query.session_id).await? {
        DispatchOutcome::Buffered(response) => Ok(Json(response).into_response()),
        DispatchOutcome::Streaming { upstream, env } => Ok(sse_response(upstream, env, |chunk| {
            serde_json::to_value(chunk).unwrap_or_default()
        })),
    }
}

/// Unified responses endpoint: `input` in, `output` out
#[instrument(skip(state, body), fields(model = %body.model))]
pub async fn unified_responses(
    State(state): State<AppState>,
    BearerKey(api_key): BearerKey,
    RequestId(request_id): RequestId,
    Query(query): Query<SessionQuery>,
    JsonBody(body): JsonBody<ResponsesRequest>,
) -> Result<Response, ApiError> {
    let chat = responses_request_to_chat(body)?;
    let admitted = admit(&state, request_id, api_key, &chat, Dialect::Responses).await?;

    match dispatch(&state, admitted, chat, query.session_id).await? {
        DispatchOutcome::Buffered(response) => {
            Ok(Json(chat_response_to_responses(&response)).into_response())
        }
        DispatchOutcome::Streaming { upstream, env } => {
            Ok(sse_response(upstream, env, chat_chunk_to_response_chunk))
        }
    }
}

/// Anthropic messages endpoint; buffered only
#[instrument(skip(state, body), fields(model = %body.model))]
pub async fn anthropic_messages(
    State(state): State<AppState>,
    BearerKey(api_key): BearerKey,
    RequestId(request_id): RequestId,
    Query(query): Query<SessionQuery>,
    JsonBody(body): JsonBody<AnthropicMessagesRequest>,
) -> Result<Response, ApiError> {
    let model = body.model.clone();
    let chat = messages_request_to_chat(body)?;
    if chat.stream {
        return Err(ApiError::bad_request(
            "streaming is not supported on /v1/messages",
        ));
    }

    let admitted = admit(&state, request_id, api_key, &chat, Dialect::Messages).await?;

    match dispatch(&state, admitted, chat, query.session_id).await? {
        DispatchOutcome::Buffered(response) => {
            Ok(Json(chat_response_to_messages(&response, &model)).into_response())
        }
        DispatchOutcome::Streaming { .. } => {
            // Unreachable: stream=false was enforced above
            Err(ApiError::internal("unexpected streaming outcome"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_health_check() {
        let response = health_check().await;
        assert_eq!(response.0.status, "healthy");
    }
}
