//! 回合调用
//!
//! 每个回合在独立的 tokio 任务中运行，任务持有队列槽位直到后端事件流
//! 读取完毕。处理器通过 oneshot 等待"事件流已打开或失败"的信号：
//! 失败时返回结构化错误，成功时流式请求立即开始转发事件。

use crate::backend::BackendError;
use crate::processor::RequestContext;
use crate::server::error::ApiError;
use crate::server::AppState;
use crate::streaming::{pump_turn, EventSender, StreamConfig, TranslationSession, TurnOutcome, TurnTranscoder};
use axum::body::Body;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use std::convert::Infallible;
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};

/// 客户端事件通道容量
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// 已启动的回合
struct SpawnedTurn {
    /// 事件流打开（返回尝试次数）或驱动失败
    ready: oneshot::Receiver<Result<u32, BackendError>>,
    /// 回合结束后的聚合结果
    done: oneshot::Receiver<TurnOutcome>,
}

/// 在后台任务中排队并驱动一个回合
fn spawn_turn(
    state: &AppState,
    mut ctx: RequestContext,
    prompt: String,
    transcoder: Box<dyn TurnTranscoder>,
    sink: Option<EventSender>,
) -> SpawnedTurn {
    let (ready_tx, ready_rx) = oneshot::channel();
    let (done_tx, done_rx) = oneshot::channel();
    let queue = state.queue.clone();
    let driver = state.driver.clone();
    let max_retries = state.config.retry.max_retries;
    let max_line_bytes = state.config.streaming.max_line_bytes;
    let stream_config = StreamConfig::from(&state.config.streaming);

    tokio::spawn(async move {
        let slot = queue.acquire().await;

        // 会话后端有状态，排队期间断开的回合照常提交
        if ready_tx.is_closed() {
            warn!(request_id = %ctx.request_id, "[API] 客户端在排队期间断开，回合照常执行");
        }

        info!(
            request_id = %ctx.request_id,
            ticket = slot.ticket(),
            queued_ms = ctx.elapsed_ms(),
            "[API] 回合开始"
        );

        let handle = match driver.drive_turn(&prompt, max_retries).await {
            Ok(handle) => handle,
            Err(e) => {
                warn!(request_id = %ctx.request_id, "[API] 回合失败: {}", e);
                let _ = ready_tx.send(Err(e));
                return;
            }
        };
        ctx.record_attempts(handle.attempts);
        let _ = ready_tx.send(Ok(handle.attempts));

        let session = TranslationSession::new(transcoder, max_line_bytes);
        let mut outcome = pump_turn(handle.stream, session, stream_config, sink, &ctx.request_id).await;
        outcome.metrics.record_retries(ctx.retry_count);
        outcome.metrics.log_metrics(&ctx.request_id);

        info!(
            request_id = %ctx.request_id,
            format = ctx.format.display_name(),
            text_chars = outcome.text.chars().count(),
            input_tokens = outcome.usage.input_tokens,
            output_tokens = outcome.usage.output_tokens,
            client_disconnected = outcome.client_disconnected,
            elapsed_ms = ctx.elapsed_ms(),
            "[API] 回合结束"
        );

        let _ = done_tx.send(outcome);
        drop(slot);
    });

    SpawnedTurn {
        ready: ready_rx,
        done: done_rx,
    }
}

async fn await_ready(ready: oneshot::Receiver<Result<u32, BackendError>>) -> Result<u32, ApiError> {
    match ready.await {
        Ok(result) => result.map_err(ApiError::from),
        Err(_) => Err(ApiError::TurnAborted),
    }
}

/// 流式回合：事件流打开后返回 SSE 响应
pub async fn stream_turn(
    state: &AppState,
    ctx: RequestContext,
    prompt: String,
    transcoder: Box<dyn TurnTranscoder>,
) -> Response {
    let (tx, mut rx) = mpsc::channel::<Bytes>(EVENT_CHANNEL_CAPACITY);
    let turn = spawn_turn(state, ctx, prompt, transcoder, Some(tx));

    if let Err(e) = await_ready(turn.ready).await {
        return e.into_response();
    }

    let body_stream = async_stream::stream! {
        while let Some(event) = rx.recv().await {
            yield Ok::<Bytes, Infallible>(event);
        }
    };

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .header(header::CONNECTION, "keep-alive")
        .header("X-Accel-Buffering", "no")
        .body(Body::from_stream(body_stream))
        .unwrap_or_else(|_| ApiError::TurnAborted.into_response())
}

/// 非流式回合：读取完整事件流后返回聚合结果
pub async fn collect_turn(
    state: &AppState,
    ctx: RequestContext,
    prompt: String,
    transcoder: Box<dyn TurnTranscoder>,
) -> Result<TurnOutcome, ApiError> {
    let turn = spawn_turn(state, ctx, prompt, transcoder, None);
    await_ready(turn.ready).await?;

    let outcome = turn.done.await.map_err(|_| ApiError::TurnAborted)?;
    match outcome.error {
        Some(e) => Err(ApiError::Stream(e)),
        None => Ok(outcome),
    }
}
