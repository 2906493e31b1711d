//! 回合流式管理器
//!
//! 把后端事件流完整地泵入 [`TranslationSession`]，并把转码后的事件
//! 转发给客户端。客户端断开后继续读取后端直到流结束，
//! 回合总时长与 chunk 间隔分别受超时约束。
//!
//! 回合结束信号之后后端可能仍保持连接：剩余数据只在 `drain_grace_ms`
//! 内继续读取，此阶段的超时或传输错误只结束读取，不算回合失败。

use crate::config::StreamingSettings;
use crate::streaming::classifier::TokenUsage;
use crate::streaming::converter::TranslationSession;
use crate::streaming::error::StreamError;
use crate::streaming::metrics::StreamMetrics;
use crate::streaming::traits::StreamResponse;
use bytes::Bytes;
use futures::StreamExt;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, warn};

// ============================================================================
// 配置
// ============================================================================

/// 流式配置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamConfig {
    /// 回合总超时（毫秒）
    pub timeout_ms: u64,
    /// 两个 chunk 之间的最大等待时间（毫秒）
    pub chunk_timeout_ms: u64,
    /// 回合结束后读取残留数据的等待上限（毫秒）
    pub drain_grace_ms: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self::from(&StreamingSettings::default())
    }
}

impl From<&StreamingSettings> for StreamConfig {
    fn from(settings: &StreamingSettings) -> Self {
        Self {
            timeout_ms: settings.timeout_ms,
            chunk_timeout_ms: settings.chunk_timeout_ms,
            drain_grace_ms: settings.drain_grace_ms,
        }
    }
}

impl StreamConfig {
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn with_chunk_timeout_ms(mut self, chunk_timeout_ms: u64) -> Self {
        self.chunk_timeout_ms = chunk_timeout_ms;
        self
    }

    pub fn with_drain_grace_ms(mut self, drain_grace_ms: u64) -> Self {
        self.drain_grace_ms = drain_grace_ms;
        self
    }

    pub fn timeout_duration(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn chunk_timeout_duration(&self) -> Duration {
        Duration::from_millis(self.chunk_timeout_ms)
    }

    pub fn drain_grace_duration(&self) -> Duration {
        Duration::from_millis(self.drain_grace_ms)
    }
}

// ============================================================================
// 回合结果
// ============================================================================

/// 一个回合的最终结果
#[derive(Debug)]
pub struct TurnOutcome {
    /// 拼接后的完整文本
    pub text: String,
    pub usage: TokenUsage,
    /// 流式过程中的错误（已经以带内事件发送）
    pub error: Option<StreamError>,
    /// 客户端是否在回合结束前断开
    pub client_disconnected: bool,
    pub metrics: StreamMetrics,
}

/// 发送给客户端的事件通道
pub type EventSender = mpsc::Sender<Bytes>;

// ============================================================================
// 泵送
// ============================================================================

/// 读取后端流直到结束或超时
///
/// `sink` 为 `None` 时只聚合结果（非流式请求）。
/// 终止事件发送后立即关闭客户端通道，后端剩余部分继续被读取但不再转发。
pub async fn pump_turn(
    mut source: StreamResponse,
    mut session: TranslationSession,
    config: StreamConfig,
    sink: Option<EventSender>,
    request_id: &str,
) -> TurnOutcome {
    let deadline = Instant::now() + config.timeout_duration();
    let mut sink = sink;
    let mut client_disconnected = false;
    let mut error = None;
    // 收到回合结束信号后的读取截止时间
    let mut drain_deadline: Option<Instant> = None;

    loop {
        if let Some(drain_until) = drain_deadline {
            match tokio::time::timeout_at(drain_until.min(deadline), source.next()).await {
                Ok(Some(Ok(chunk))) => {
                    session.feed(&chunk);
                    continue;
                }
                Ok(None) => debug!(request_id = %request_id, "[STREAM] 后端流已关闭"),
                Ok(Some(Err(e))) => debug!(
                    request_id = %request_id,
                    "[STREAM] 回合已结束，忽略后端残留读取错误: {}", e
                ),
                Err(_) => debug!(
                    request_id = %request_id,
                    "[STREAM] 回合已结束，后端未关闭连接，停止读取: drain_grace_ms={}",
                    config.drain_grace_ms
                ),
            }
            session.finish();
            break;
        }

        let next = tokio::time::timeout_at(
            deadline,
            tokio::time::timeout(config.chunk_timeout_duration(), source.next()),
        )
        .await;
        let source_done = !matches!(&next, Ok(Ok(Some(Ok(_)))));

        let events = match next {
            Err(_) => {
                warn!(request_id = %request_id, "[STREAM] 回合超时: timeout_ms={}", config.timeout_ms);
                error = Some(StreamError::Timeout);
                session.fail(&StreamError::Timeout)
            }
            Ok(Err(_)) => {
                warn!(
                    request_id = %request_id,
                    "[STREAM] chunk 间隔超时: chunk_timeout_ms={}", config.chunk_timeout_ms
                );
                error = Some(StreamError::Timeout);
                session.fail(&StreamError::Timeout)
            }
            Ok(Ok(None)) => session.finish(),
            Ok(Ok(Some(Err(e)))) => {
                warn!(
                    request_id = %request_id,
                    error_type = e.error_type_string(),
                    "[STREAM] 读取后端流失败: {}", e
                );
                let events = session.fail(&e);
                error = Some(e);
                events
            }
            Ok(Ok(Some(Ok(chunk)))) => session.feed(&chunk),
        };

        client_disconnected |= forward(&mut sink, events, request_id).await;
        if source_done {
            break;
        }
        if session.is_finished() {
            if sink.take().is_some() {
                debug!(request_id = %request_id, "[STREAM] 终止事件已发送，继续读取后端剩余数据");
            }
            drain_deadline = Some(Instant::now() + config.drain_grace_duration());
        }
    }

    let metrics = session.metrics().clone();
    TurnOutcome {
        text: session.full_text().to_string(),
        usage: session.usage(),
        error,
        client_disconnected,
        metrics,
    }
}

/// 转发事件，返回客户端是否在本次转发中断开
///
/// 断开后丢弃通道，后续事件不再发送。
async fn forward(sink: &mut Option<EventSender>, events: Vec<String>, request_id: &str) -> bool {
    let Some(tx) = sink.as_ref() else {
        return false;
    };
    for event in events {
        if tx.send(Bytes::from(event)).await.is_err() {
            warn!(request_id = %request_id, "[STREAM] 客户端已断开，继续读取后端直到回合结束");
            *sink = None;
            return true;
        }
    }
    false
}

// ============================================================================
// 测试模块
// ============================================================================
