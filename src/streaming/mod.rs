//! 流式传输核心模块
//!
//! 后端事件流 → 客户端 SSE 的完整管线。
//!
//! # 主要组件
//!
//! - `line_buffer`: 字节 chunk → 完整文本行
//! - `classifier`: 文本行 → 后端事件（文本 / 回合结束 / 使用量）
//! - `chat_chunks`: Chat Completions chunk 转码器
//! - `responses`: Responses 生命周期事件转码器
//! - `converter`: 单个回合的翻译会话
//! - `manager`: 泵送后端流、超时与客户端断开处理
//! - `error` / `metrics` / `traits`: 公共类型

pub mod chat_chunks;
pub mod classifier;
pub mod converter;
pub mod error;
pub mod line_buffer;
pub mod manager;
pub mod metrics;
pub mod responses;
pub mod traits;

// 重新导出核心类型
pub use chat_chunks::{build_chat_completion, ChatChunkTranscoder};
pub use classifier::{
    classify_event, classify_line, extract_text, extract_usage, is_stream_end, BackendEvent,
    ClassifiedLine, EventShape, TokenUsage, UPSTREAM_TERMINATOR,
};
pub use converter::TranslationSession;
pub use error::StreamError;
pub use line_buffer::SseLineBuffer;
pub use manager::{pump_turn, EventSender, StreamConfig, TurnOutcome};
pub use metrics::StreamMetrics;
pub use responses::{build_response_object, ResponsesTranscoder};
pub use traits::{
    reqwest_stream_to_stream_response, ClientFormat, StreamResponse, TurnSummary,
    TurnTranscoder,
};
