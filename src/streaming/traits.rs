//! 流式转码 Trait 定义
//!
//! 后端事件流先经过行重组与事件分类，再交给 [`TurnTranscoder`]
//! 转换为某一种客户端 SSE 词汇。

use crate::streaming::classifier::TokenUsage;
use crate::streaming::StreamError;
use bytes::Bytes;
use futures::Stream;
use std::pin::Pin;

/// 后端原始字节流
pub type StreamResponse = Pin<Box<dyn Stream<Item = Result<Bytes, StreamError>> + Send>>;

/// 客户端流式格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientFormat {
    /// `chat.completion.chunk` 流，以 `data: [DONE]` 结束
    ChatCompletions,
    /// Responses 生命周期事件流（`event:` + `data:`）
    Responses,
}

impl ClientFormat {
    /// 获取格式的显示名称
    pub fn display_name(&self) -> &'static str {
        match self {
            ClientFormat::ChatCompletions => "Chat Completions",
            ClientFormat::Responses => "Responses",
        }
    }
}

/// 回合结束时交给转码器的汇总信息
#[derive(Debug, Clone, Copy)]
pub struct TurnSummary<'a> {
    /// 按到达顺序拼接的完整文本
    pub text: &'a str,
    /// 后端报告的使用量（未报告时为零）
    pub usage: TokenUsage,
}

/// 回合转码器
///
/// 每个实现只负责一种客户端词汇，状态归单个请求独占。
/// 返回值为完整的 SSE 事件字符串（含结尾空行）。
pub trait TurnTranscoder: Send {
    /// 处理一段可见文本
    fn on_text(&mut self, delta: &str) -> Vec<String>;

    /// 回合结束（真实或补发），多次调用只生效一次
    fn on_end(&mut self, summary: TurnSummary<'_>) -> Vec<String>;

    /// 流式过程中出现错误时的带内错误事件
    fn on_error(&mut self, error: &StreamError) -> Vec<String>;

    /// 是否已经发送终止事件
    fn is_finished(&self) -> bool;

    /// 目标格式
    fn format(&self) -> ClientFormat;
}

/// 将 reqwest 的 bytes_stream 转换为 StreamResponse
pub fn reqwest_stream_to_stream_response(response: reqwest::Response) -> StreamResponse {
    use futures::StreamExt;

    let stream = response
        .bytes_stream()
        .map(|result| result.map_err(StreamError::from));

    Box::pin(stream)
}
