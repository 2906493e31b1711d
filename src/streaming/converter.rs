//! 回合翻译会话
//!
//! 把后端原始字节流转换为客户端 SSE 事件：
//!
//! ```text
//! bytes → SseLineBuffer → classify_line → TurnTranscoder → SSE 事件
//! ```
//!
//! 每个请求独占一个 [`TranslationSession`]，累积文本与使用量，
//! 并保证无论后端是否发出结束信号，终止事件都只发送一次。

use crate::streaming::classifier::{classify_line, BackendEvent, ClassifiedLine, TokenUsage};
use crate::streaming::line_buffer::SseLineBuffer;
use crate::streaming::metrics::StreamMetrics;
use crate::streaming::traits::{ClientFormat, TurnSummary, TurnTranscoder};
use crate::streaming::StreamError;

/// 单个回合的翻译会话
pub struct TranslationSession {
    line_buffer: SseLineBuffer,
    transcoder: Box<dyn TurnTranscoder>,
    full_text: String,
    usage: TokenUsage,
    /// 已收到回合结束信号或上游结束标记，之后的事件被忽略
    ended: bool,
    metrics: StreamMetrics,
}

impl std::fmt::Debug for TranslationSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TranslationSession")
            .field("format", &self.transcoder.format())
            .field("text_len", &self.full_text.len())
            .field("usage", &self.usage)
            .field("ended", &self.ended)
            .finish()
    }
}

impl TranslationSession {
    pub fn new(transcoder: Box<dyn TurnTranscoder>, max_line_bytes: usize) -> Self {
        Self {
            line_buffer: SseLineBuffer::with_max_line_bytes(max_line_bytes),
            transcoder,
            full_text: String::new(),
            usage: TokenUsage::default(),
            ended: false,
            metrics: StreamMetrics::new(),
        }
    }

    /// 处理一个后端字节 chunk
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        self.metrics.record_chunk(chunk.len());
        let mut events = Vec::new();
        for line in self.line_buffer.push(chunk) {
            events.extend(self.process_line(&line));
        }
        events
    }

    /// 后端流正常结束
    ///
    /// 处理残留片段；如果后端没有发出结束信号，补发终止事件。
    pub fn finish(&mut self) -> Vec<String> {
        let mut events = Vec::new();
        if let Some(line) = self.line_buffer.flush() {
            events.extend(self.process_line(&line));
        }
        if !self.transcoder.is_finished() {
            tracing::debug!(
                "[STREAM] 后端流关闭但未收到结束信号，补发终止事件: format={}",
                self.transcoder.format().display_name()
            );
        }
        events.extend(self.end_turn());
        self.metrics.buffer_overflow_count = self.line_buffer.dropped_lines();
        self.metrics.finish();
        events
    }

    /// 流式过程中出错：先发带内错误事件，再补发终止事件
    pub fn fail(&mut self, error: &StreamError) -> Vec<String> {
        let mut events = self.transcoder.on_error(error);
        events.extend(self.end_turn());
        self.metrics.buffer_overflow_count = self.line_buffer.dropped_lines();
        self.metrics.finish();
        events
    }

    fn process_line(&mut self, line: &str) -> Vec<String> {
        match classify_line(line) {
            ClassifiedLine::Skip => {
                if line.trim_start().starts_with("data:") {
                    self.metrics.record_parse_error();
                }
                Vec::new()
            }
            ClassifiedLine::Terminator => self.end_turn(),
            ClassifiedLine::Event(event) => self.process_event(event),
        }
    }

    fn process_event(&mut self, event: BackendEvent) -> Vec<String> {
        if self.ended {
            return Vec::new();
        }
        if let Some(usage) = event.usage {
            self.usage = usage;
        }

        let mut events = Vec::new();
        if let Some(text) = event.text {
            self.full_text.push_str(&text);
            events.extend(self.transcoder.on_text(&text));
        }
        if event.end_of_turn {
            events.extend(self.end_turn());
        }
        events
    }

    fn end_turn(&mut self) -> Vec<String> {
        self.ended = true;
        self.transcoder.on_end(TurnSummary {
            text: &self.full_text,
            usage: self.usage,
        })
    }

    /// 按到达顺序拼接的完整文本
    pub fn full_text(&self) -> &str {
        &self.full_text
    }

    pub fn usage(&self) -> TokenUsage {
        self.usage
    }

    /// 终止事件是否已发送
    pub fn is_finished(&self) -> bool {
        self.transcoder.is_finished()
    }

    pub fn format(&self) -> ClientFormat {
        self.transcoder.format()
    }

    pub fn metrics(&self) -> &StreamMetrics {
        &self.metrics
    }
}
