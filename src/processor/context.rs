//! 请求上下文
//!
//! 定义请求处理过程中的上下文信息

use crate::streaming::ClientFormat;
use std::time::Instant;

/// 请求上下文
///
/// 一个客户端调用从排队到回合结束都携带同一份上下文，
/// `request_id` 出现在该调用的每一行日志里。
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// 请求唯一标识
    pub request_id: String,
    /// 请求开始时间
    pub start_time: Instant,
    /// 响应中回显的模型名称
    pub model: String,
    /// 客户端格式
    pub format: ClientFormat,
    /// 是否为流式请求
    pub is_stream: bool,
    /// 打开事件流前的重试次数
    pub retry_count: u32,
}

impl RequestContext {
    /// 创建新的请求上下文
    ///
    /// 请求未指定模型时使用 `default_model`。
    pub fn new(model: &str, default_model: &str, format: ClientFormat) -> Self {
        let model = if model.trim().is_empty() {
            default_model.to_string()
        } else {
            model.to_string()
        };
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            start_time: Instant::now(),
            model,
            format,
            is_stream: false,
            retry_count: 0,
        }
    }

    /// 设置流式请求标志
    pub fn with_stream(mut self, is_stream: bool) -> Self {
        self.is_stream = is_stream;
        self
    }

    /// 根据打开事件流所用的尝试次数记录重试次数
    pub fn record_attempts(&mut self, attempts: u32) {
        self.retry_count = attempts.saturating_sub(1);
    }

    /// 获取已耗时（毫秒）
    pub fn elapsed_ms(&self) -> u64 {
        self.start_time.elapsed().as_millis() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_context_new() {
        let ctx = RequestContext::new("gpt-4o", "session-agent", ClientFormat::ChatCompletions);

        assert!(!ctx.request_id.is_empty());
        assert_eq!(ctx.model, "gpt-4o");
        assert_eq!(ctx.retry_count, 0);
        assert!(!ctx.is_stream);
        assert!(ctx.elapsed_ms() < 1_000);
    }

    #[test]
    fn test_request_context_default_model() {
        let ctx = RequestContext::new("  ", "session-agent", ClientFormat::Responses);
        assert_eq!(ctx.model, "session-agent");
    }

    #[test]
    fn test_request_context_with_stream_and_attempts() {
        let mut ctx =
            RequestContext::new("m", "d", ClientFormat::ChatCompletions).with_stream(true);
        assert!(ctx.is_stream);

        ctx.record_attempts(3);
        assert_eq!(ctx.retry_count, 2);
        ctx.record_attempts(0);
        assert_eq!(ctx.retry_count, 0);
    }
}
