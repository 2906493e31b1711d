//! Responses API 流式转码器
//!
//! 生成带 `sequence_number` 的生命周期事件：
//! 前导事件（created / in_progress / output_item.added / content_part.added）
//! 在第一段文本到达时发送一次，之后是文本增量，最后是 done 系列与 `response.completed`。

use crate::streaming::classifier::TokenUsage;
use crate::streaming::traits::{ClientFormat, TurnSummary, TurnTranscoder};
use crate::streaming::StreamError;
use serde_json::{json, Map, Value};

/// Responses 转码器
#[derive(Debug)]
pub struct ResponsesTranscoder {
    response_id: String,
    message_id: String,
    model: String,
    created_at: i64,
    sequence_number: u64,
    preamble_sent: bool,
    completed: bool,
    emit_empty_lifecycle: bool,
}

impl ResponsesTranscoder {
    pub fn new(model: impl Into<String>, emit_empty_lifecycle: bool) -> Self {
        Self::with_identity(
            format!("resp_{}", uuid::Uuid::new_v4().simple()),
            format!("msg_{}", uuid::Uuid::new_v4().simple()),
            model,
            chrono::Utc::now().timestamp(),
            emit_empty_lifecycle,
        )
    }

    /// 使用固定标识创建（测试中保证输出可比较）
    pub fn with_identity(
        response_id: impl Into<String>,
        message_id: impl Into<String>,
        model: impl Into<String>,
        created_at: i64,
        emit_empty_lifecycle: bool,
    ) -> Self {
        Self {
            response_id: response_id.into(),
            message_id: message_id.into(),
            model: model.into(),
            created_at,
            sequence_number: 0,
            preamble_sent: false,
            completed: false,
            emit_empty_lifecycle,
        }
    }

    pub fn response_id(&self) -> &str {
        &self.response_id
    }

    fn next_sequence(&mut self) -> u64 {
        let seq = self.sequence_number;
        self.sequence_number += 1;
        seq
    }

    /// 生成一条 `event:` + `data:` 事件，`type` 与 `sequence_number` 合并进数据对象
    fn event(&mut self, event_type: &str, data: Value) -> String {
        let mut obj = Map::new();
        obj.insert("type".to_string(), Value::String(event_type.to_string()));
        obj.insert("sequence_number".to_string(), json!(self.next_sequence()));
        if let Value::Object(fields) = data {
            obj.extend(fields);
        }
        format!("event: {}\ndata: {}\n\n", event_type, Value::Object(obj))
    }

    fn response_shell(&self, status: &str) -> Value {
        json!({
            "id": self.response_id,
            "object": "response",
            "created_at": self.created_at,
            "status": status,
            "model": self.model,
            "output": [],
        })
    }

    fn preamble(&mut self) -> Vec<String> {
        self.preamble_sent = true;
        let created = json!({ "response": self.response_shell("in_progress") });
        let in_progress = json!({ "response": self.response_shell("in_progress") });
        let item_added = json!({
            "output_index": 0,
            "item": {
                "type": "message",
                "id": self.message_id,
                "role": "assistant",
                "status": "in_progress",
                "content": [],
            }
        });
        let part_added = json!({
            "item_id": self.message_id,
            "output_index": 0,
            "content_index": 0,
            "part": { "type": "output_text", "text": "", "annotations": [] }
        });

        vec![
            self.event("response.created", created),
            self.event("response.in_progress", in_progress),
            self.event("response.output_item.added", item_added),
            self.event("response.content_part.added", part_added),
        ]
    }
}

impl TurnTranscoder for ResponsesTranscoder {
    fn on_text(&mut self, delta: &str) -> Vec<String> {
        if self.completed || delta.is_empty() {
            return Vec::new();
        }

        let mut events = if self.preamble_sent {
            Vec::with_capacity(1)
        } else {
            self.preamble()
        };
        let data = json!({
            "item_id": self.message_id,
            "output_index": 0,
            "content_index": 0,
            "delta": delta,
        });
        events.push(self.event("response.output_text.delta", data));
        events
    }

    fn on_end(&mut self, summary: TurnSummary<'_>) -> Vec<String> {
        if self.completed {
            return Vec::new();
        }
        self.completed = true;

        let mut events = Vec::new();
        if !self.preamble_sent {
            if !self.emit_empty_lifecycle {
                tracing::debug!(
                    "[STREAM] 回合没有文本输出，跳过 Responses 生命周期: response_id={}",
                    self.response_id
                );
                return events;
            }
            events.extend(self.preamble());
        }

        let text_done = json!({
            "item_id": self.message_id,
            "output_index": 0,
            "content_index": 0,
            "text": summary.text,
        });
        let part_done = json!({
            "item_id": self.message_id,
            "output_index": 0,
            "content_index": 0,
            "part": output_text_part(summary.text),
        });
        let item_done = json!({
            "output_index": 0,
            "item": message_item(&self.message_id, summary.text),
        });
        let completed = json!({
            "response": response_object(
                &self.response_id,
                &self.message_id,
                &self.model,
                self.created_at,
                summary.text,
                summary.usage,
            )
        });

        events.push(self.event("response.output_text.done", text_done));
        events.push(self.event("response.content_part.done", part_done));
        events.push(self.event("response.output_item.done", item_done));
        events.push(self.event("response.completed", completed));
        events
    }

    fn on_error(&mut self, error: &StreamError) -> Vec<String> {
        if self.completed {
            return Vec::new();
        }
        let data = json!({
            "code": "proxy_error",
            "message": error.to_string(),
        });
        vec![self.event("error", data)]
    }

    fn is_finished(&self) -> bool {
        self.completed
    }

    fn format(&self) -> ClientFormat {
        ClientFormat::Responses
    }
}

fn output_text_part(text: &str) -> Value {
    json!({ "type": "output_text", "text": text, "annotations": [] })
}

fn message_item(message_id: &str, text: &str) -> Value {
    json!({
        "type": "message",
        "id": message_id,
        "role": "assistant",
        "status": "completed",
        "content": [output_text_part(text)],
    })
}

fn response_object(
    response_id: &str,
    message_id: &str,
    model: &str,
    created_at: i64,
    text: &str,
    usage: TokenUsage,
) -> Value {
    json!({
        "id": response_id,
        "object": "response",
        "created_at": created_at,
        "status": "completed",
        "model": model,
        "output": [message_item(message_id, text)],
        "output_text": text,
        "usage": {
            "input_tokens": usage.input_tokens,
            "output_tokens": usage.output_tokens,
            "total_tokens": usage.total_tokens(),
        },
    })
}

/// 构建非流式 `response` 对象
pub fn build_response_object(model: &str, text: &str, usage: TokenUsage) -> Value {
    response_object(
        &format!("resp_{}", uuid::Uuid::new_v4().simple()),
        &format!("msg_{}", uuid::Uuid::new_v4().simple()),
        model,
        chrono::Utc::now().timestamp(),
        text,
        usage,
    )
}
