//! API 端点处理器
//!
//! 处理 Chat Completions 与 Responses 两种格式的请求。
//! 请求体按原始字节读取后再解析，保证格式错误也返回统一的错误形态。

use axum::{
    body::Bytes,
    extract::State,
    response::{IntoResponse, Response},
    Json,
};
use serde::de::DeserializeOwned;

use crate::converter::TurnPrompt;
use crate::models::openai::ChatCompletionRequest;
use crate::models::responses::ResponsesRequest;
use crate::processor::RequestContext;
use crate::server::error::ApiError;
use crate::server::AppState;
use crate::streaming::{
    build_chat_completion, build_response_object, ChatChunkTranscoder, ClientFormat,
    ResponsesTranscoder,
};

use super::turn_calls::{collect_turn, stream_turn};

fn parse_body<T: DeserializeOwned>(body: &Bytes) -> Result<T, ApiError> {
    serde_json::from_slice(body)
        .map_err(|e| ApiError::InvalidRequest(format!("invalid request body: {}", e)))
}

pub async fn chat_completions(State(state): State<AppState>, body: Bytes) -> Response {
    let request: ChatCompletionRequest = match parse_body(&body) {
        Ok(r) => r,
        Err(e) => return e.into_response(),
    };
    let prompt = match TurnPrompt::from_chat(&request.messages) {
        Ok(p) => p,
        Err(e) => return ApiError::from(e).into_response(),
    };

    let ctx = RequestContext::new(
        &request.model,
        &state.config.backend.model,
        ClientFormat::ChatCompletions,
    )
    .with_stream(request.stream);

    tracing::info!(
        "[API] POST /v1/chat/completions request_id={} model={} stream={} messages={}",
        ctx.request_id,
        ctx.model,
        request.stream,
        request.messages.len()
    );

    let transcoder = Box::new(ChatChunkTranscoder::new(
        ctx.model.clone(),
        request.include_usage(),
    ));
    let model = ctx.model.clone();

    if request.stream {
        return stream_turn(&state, ctx, prompt.render(), transcoder).await;
    }

    match collect_turn(&state, ctx, prompt.render(), transcoder).await {
        Ok(outcome) => Json(build_chat_completion(&model, &outcome.text, outcome.usage)).into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn responses(State(state): State<AppState>, body: Bytes) -> Response {
    let request: ResponsesRequest = match parse_body(&body) {
        Ok(r) => r,
        Err(e) => return e.into_response(),
    };
    let prompt = match TurnPrompt::from_responses(&request) {
        Ok(p) => p,
        Err(e) => return ApiError::from(e).into_response(),
    };

    let ctx = RequestContext::new(
        &request.model,
        &state.config.backend.model,
        ClientFormat::Responses,
    )
    .with_stream(request.stream);

    tracing::info!(
        "[API] POST /v1/responses request_id={} model={} stream={}",
        ctx.request_id,
        ctx.model,
        request.stream
    );

    let transcoder = Box::new(ResponsesTranscoder::new(
        ctx.model.clone(),
        state.config.streaming.emit_empty_lifecycle,
    ));
    let model = ctx.model.clone();

    if request.stream {
        return stream_turn(&state, ctx, prompt.render(), transcoder).await;
    }

    match collect_turn(&state, ctx, prompt.render(), transcoder).await {
        Ok(outcome) => Json(build_response_object(&model, &outcome.text, outcome.usage)).into_response(),
        Err(e) => e.into_response(),
    }
}
