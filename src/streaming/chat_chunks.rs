//! Chat Completions 流式转码器
//!
//! 将后端文本片段转换为 `chat.completion.chunk` SSE 事件，
//! 以 `data: [DONE]` 结束。

use crate::models::openai::{ChatChoice, ChatCompletionResponse, ResponseMessage, Usage};
use crate::streaming::classifier::TokenUsage;
use crate::streaming::traits::{ClientFormat, TurnSummary, TurnTranscoder};
use crate::streaming::StreamError;
use serde_json::{json, Value};

/// 客户端终止标记
const DONE_EVENT: &str = "data: [DONE]\n\n";

/// 格式化为 `data:` SSE 事件
fn data_event(payload: &Value) -> String {
    format!("data: {}\n\n", payload)
}

/// Chat Completions 转码器
///
/// id、model、created 在整个回合内固定。
#[derive(Debug)]
pub struct ChatChunkTranscoder {
    id: String,
    model: String,
    created: i64,
    include_usage: bool,
    role_sent: bool,
    finished: bool,
}

impl ChatChunkTranscoder {
    pub fn new(model: impl Into<String>, include_usage: bool) -> Self {
        Self::with_identity(
            format!("chatcmpl-{}", uuid::Uuid::new_v4()),
            model,
            chrono::Utc::now().timestamp(),
            include_usage,
        )
    }

    /// 使用固定标识创建（测试中保证输出可比较）
    pub fn with_identity(
        id: impl Into<String>,
        model: impl Into<String>,
        created: i64,
        include_usage: bool,
    ) -> Self {
        Self {
            id: id.into(),
            model: model.into(),
            created,
            include_usage,
            role_sent: false,
            finished: false,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    fn chunk(&self, choices: Value) -> Value {
        json!({
            "id": self.id,
            "object": "chat.completion.chunk",
            "created": self.created,
            "model": self.model,
            "choices": choices,
        })
    }
}

impl TurnTranscoder for ChatChunkTranscoder {
    fn on_text(&mut self, delta: &str) -> Vec<String> {
        if self.finished || delta.is_empty() {
            return Vec::new();
        }

        let delta_obj = if self.role_sent {
            json!({ "content": delta })
        } else {
            self.role_sent = true;
            json!({ "role": "assistant", "content": delta })
        };

        let chunk = self.chunk(json!([{
            "index": 0,
            "delta": delta_obj,
            "finish_reason": null,
        }]));
        vec![data_event(&chunk)]
    }

    fn on_end(&mut self, summary: TurnSummary<'_>) -> Vec<String> {
        if self.finished {
            return Vec::new();
        }
        self.finished = true;

        let mut events = Vec::with_capacity(3);
        let stop = self.chunk(json!([{
            "index": 0,
            "delta": {},
            "finish_reason": "stop",
        }]));
        events.push(data_event(&stop));

        if self.include_usage {
            let mut usage_chunk = self.chunk(json!([]));
            usage_chunk["usage"] = json!(Usage::from(summary.usage));
            events.push(data_event(&usage_chunk));
        }

        events.push(DONE_EVENT.to_string());
        events
    }

    fn on_error(&mut self, error: &StreamError) -> Vec<String> {
        if self.finished {
            return Vec::new();
        }
        let payload = json!({
            "error": {
                "message": error.to_string(),
                "type": "proxy_error",
            }
        });
        vec![data_event(&payload)]
    }

    fn is_finished(&self) -> bool {
        self.finished
    }

    fn format(&self) -> ClientFormat {
        ClientFormat::ChatCompletions
    }
}

/// 构建非流式 `chat.completion` 响应
pub fn build_chat_completion(model: &str, text: &str, usage: TokenUsage) -> ChatCompletionResponse {
    ChatCompletionResponse {
        id: format!("chatcmpl-{}", uuid::Uuid::new_v4()),
        object: "chat.completion".to_string(),
        created: chrono::Utc::now().timestamp(),
        model: model.to_string(),
        choices: vec![ChatChoice {
            index: 0,
            message: ResponseMessage {
                role: "assistant".to_string(),
                content: text.to_string(),
            },
            finish_reason: "stop".to_string(),
        }],
        usage: usage.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(event: &str) -> Value {
        let body = event
            .strip_prefix("data: ")
            .and_then(|s| s.strip_suffix("\n\n"))
            .unwrap();
        serde_json::from_str(body).unwrap()
    }

    fn transcoder(include_usage: bool) -> ChatChunkTranscoder {
        ChatChunkTranscoder::with_identity("chatcmpl-test", "session-agent", 1_700_000_000, include_usage)
    }

    #[test]
    fn test_first_chunk_carries_role() {
        let mut t = transcoder(false);
        let first = payload(&t.on_text("Hel")[0]);
        let second = payload(&t.on_text("lo")[0]);

        assert_eq!(first["object"], "chat.completion.chunk");
        assert_eq!(first["choices"][0]["delta"]["role"], "assistant");
        assert_eq!(first["choices"][0]["delta"]["content"], "Hel");
        assert!(second["choices"][0]["delta"].get("role").is_none());
        assert_eq!(second["choices"][0]["delta"]["content"], "lo");
        assert_eq!(first["id"], second["id"]);
        assert_eq!(first["created"], 1_700_000_000);
    }

    #[test]
    fn test_end_emits_stop_then_done_once() {
        let mut t = transcoder(false);
        t.on_text("hi");
        let summary = TurnSummary { text: "hi", usage: TokenUsage::default() };

        let events = t.on_end(summary);
        assert_eq!(events.len(), 2);
        let stop = payload(&events[0]);
        assert_eq!(stop["choices"][0]["finish_reason"], "stop");
        assert_eq!(stop["choices"][0]["delta"], json!({}));
        assert_eq!(events[1], DONE_EVENT);

        assert!(t.is_finished());
        assert!(t.on_end(summary).is_empty());
        assert!(t.on_text("late").is_empty());
    }

    #[test]
    fn test_usage_chunk_between_stop_and_done() {
        let mut t = transcoder(true);
        let events = t.on_end(TurnSummary { text: "", usage: TokenUsage::new(12, 5) });

        assert_eq!(events.len(), 3);
        let usage = payload(&events[1]);
        assert_eq!(usage["choices"], json!([]));
        assert_eq!(usage["usage"]["prompt_tokens"], 12);
        assert_eq!(usage["usage"]["completion_tokens"], 5);
        assert_eq!(usage["usage"]["total_tokens"], 17);
        assert_eq!(events[2], DONE_EVENT);
    }

    #[test]
    fn test_error_event_shape() {
        let mut t = transcoder(false);
        let events = t.on_error(&StreamError::Timeout);
        let err = payload(&events[0]);
        assert_eq!(err["error"]["type"], "proxy_error");
        assert_eq!(err["error"]["message"], "backend stream timed out");
        assert!(!t.is_finished());
    }

    #[test]
    fn test_build_chat_completion() {
        let resp = build_chat_completion("m", "Hello", TokenUsage::default());
        assert!(resp.id.starts_with("chatcmpl-"));
        assert_eq!(resp.object, "chat.completion");
        assert_eq!(resp.choices[0].message.content, "Hello");
        assert_eq!(resp.choices[0].finish_reason, "stop");
        assert_eq!(resp.usage, Usage::default());
    }
}
