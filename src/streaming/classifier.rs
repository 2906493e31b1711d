//! 后端事件分类器
//!
//! 后端事件词汇只有部分文档：第一方格式（`event_kind` + `part`/`delta`）
//! 与若干兼容后端的格式同时存在。这里把判定写成对 [`EventShape`] 的
//! 有序显式分派，新增格式只需要增加一个变体与一个匹配分支。
//!
//! 文本提取优先级：
//!
//! 1. 用户提示词回显 → 无文本
//! 2. `part_start` 且 part 为文本 → `part.content`
//! 3. `part_delta` 且 delta 为文本 → `delta.content_delta`
//! 4. 兼容格式（先匹配先生效）：顶层增量文本字段、`content_block_delta`、
//!    嵌套一层的增量文本字段。非文本的第一方 part 事件同样落到这一步，
//!    但不做嵌套扫描
//!
//! 回合结束判定是尽力而为的启发式，转码器在输入结束时总会补发终止事件。

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 上游流结束标记
pub const UPSTREAM_TERMINATOR: &str = "[DONE]";

/// 增量文本字段名，按优先级排列
const INCREMENTAL_TEXT_FIELDS: [&str; 3] = ["content_delta", "text_delta", "delta"];

/// 表示结束的 `type` / `event` / `event_kind` 取值
const END_TAGS: [&str; 5] = ["end", "stop", "done", "end_turn", "turn_end"];

/// Token 使用量
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl TokenUsage {
    pub fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }

    pub fn total_tokens(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

/// 单个后端事件的分类结果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BackendEvent {
    /// 可见文本
    pub text: Option<String>,
    /// 是否表示回合结束
    pub end_of_turn: bool,
    /// 使用量计数
    pub usage: Option<TokenUsage>,
}

/// 一行 SSE 的分类结果
#[derive(Debug, Clone, PartialEq)]
pub enum ClassifiedLine {
    /// 空行、注释、非 data 字段或无法解析的负载
    Skip,
    /// 上游结束标记 `[DONE]`（不等同于语义上的回合结束）
    Terminator,
    /// 已解析的事件
    Event(BackendEvent),
}

/// 已识别的事件形态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventShape {
    /// 用户提示词回显
    UserPromptEcho,
    /// 第一方 part 开始事件
    PartStart,
    /// 第一方 part 增量事件
    PartDelta,
    /// 顶层增量文本字段
    TopLevelDelta(&'static str),
    /// `content_block_delta` 块增量事件
    BlockDelta,
    /// 嵌套一层的增量文本字段
    NestedDelta(&'static str),
    /// 无可见文本
    Other,
}

impl EventShape {
    /// 按优先级识别事件形态
    pub fn of(event: &Value) -> Self {
        if is_user_prompt_echo(event) {
            return EventShape::UserPromptEcho;
        }
        let event_kind = str_field(event, "event_kind");
        match event_kind {
            Some("part_start") if is_text_part(event) => return EventShape::PartStart,
            Some("part_delta") if is_text_part_delta(event) => return EventShape::PartDelta,
            _ => {}
        }
        if let Some(field) = INCREMENTAL_TEXT_FIELDS
            .iter()
            .find(|f| str_field(event, f).is_some())
        {
            return EventShape::TopLevelDelta(*field);
        }
        if str_field(event, "type") == Some("content_block_delta")
            && event
                .get("delta")
                .and_then(|d| str_field(d, "type"))
                .is_some_and(|t| t == "text_delta")
        {
            return EventShape::BlockDelta;
        }
        // 非文本 part 的嵌套负载由 part_kind 定型（思考、工具参数），不参与嵌套扫描
        let first_party_part = matches!(event_kind, Some("part_start") | Some("part_delta"));
        if let Some(obj) = event.as_object().filter(|_| !first_party_part) {
            for field in INCREMENTAL_TEXT_FIELDS {
                if obj.values().any(|v| str_field(v, field).is_some()) {
                    return EventShape::NestedDelta(field);
                }
            }
        }
        EventShape::Other
    }
}

/// 分类一行 SSE
pub fn classify_line(line: &str) -> ClassifiedLine {
    let line = line.trim_end();
    if line.is_empty() || line.starts_with(':') {
        return ClassifiedLine::Skip;
    }
    let Some(payload) = line.strip_prefix("data:") else {
        return ClassifiedLine::Skip;
    };
    let payload = payload.trim();
    if payload == UPSTREAM_TERMINATOR {
        return ClassifiedLine::Terminator;
    }

    match serde_json::from_str::<Value>(payload) {
        Ok(event) => ClassifiedLine::Event(classify_event(&event)),
        Err(_) => ClassifiedLine::Skip,
    }
}

/// 分类一个已解析的事件
pub fn classify_event(event: &Value) -> BackendEvent {
    BackendEvent {
        text: extract_text(event),
        end_of_turn: is_stream_end(event),
        usage: extract_usage(event),
    }
}

/// 提取可见文本
///
/// 空字符串视为无文本。
pub fn extract_text(event: &Value) -> Option<String> {
    let text = match EventShape::of(event) {
        EventShape::UserPromptEcho | EventShape::Other => None,
        EventShape::PartStart => event.get("part").and_then(|part| str_field(part, "content")),
        EventShape::PartDelta => event
            .get("delta")
            .and_then(|delta| str_field(delta, "content_delta")),
        EventShape::TopLevelDelta(field) => str_field(event, field),
        EventShape::BlockDelta => event.get("delta").and_then(|d| str_field(d, "text")),
        EventShape::NestedDelta(field) => event
            .as_object()
            .and_then(|obj| obj.values().find_map(|v| str_field(v, field))),
    };

    text.filter(|t| !t.is_empty()).map(str::to_string)
}

/// 判断事件是否表示回合结束
pub fn is_stream_end(event: &Value) -> bool {
    if extract_usage(event).is_some() {
        return true;
    }

    let event_type = str_field(event, "type");
    if event_type == Some("message_stop") {
        return true;
    }
    if event_type == Some("message_delta")
        && event
            .get("delta")
            .and_then(|d| d.get("stop_reason"))
            .is_some_and(|r| !r.is_null())
    {
        return true;
    }
    if event.get("done").and_then(Value::as_bool) == Some(true) {
        return true;
    }

    ["type", "event", "event_kind"]
        .iter()
        .filter_map(|key| str_field(event, key))
        .any(|tag| END_TAGS.contains(&tag))
}

/// 提取使用量
///
/// 需要同时存在数值型 `input_tokens` 与 `output_tokens`，
/// 位于顶层或 `usage` 对象中。
pub fn extract_usage(event: &Value) -> Option<TokenUsage> {
    usage_from(event).or_else(|| event.get("usage").and_then(usage_from))
}

fn usage_from(value: &Value) -> Option<TokenUsage> {
    let input = value.get("input_tokens")?.as_u64()?;
    let output = value.get("output_tokens")?.as_u64()?;
    Some(TokenUsage::new(input, output))
}

fn is_user_prompt_echo(event: &Value) -> bool {
    str_field(event, "event_kind") == Some("user_prompt")
        || event
            .get("part")
            .and_then(|part| str_field(part, "part_kind"))
            == Some("user-prompt")
}

fn is_text_part(event: &Value) -> bool {
    event
        .get("part")
        .and_then(|part| str_field(part, "part_kind"))
        == Some("text")
}

fn is_text_part_delta(event: &Value) -> bool {
    matches!(
        event
            .get("delta")
            .and_then(|delta| str_field(delta, "part_delta_kind")),
        Some("text") | Some("text_delta")
    )
}

fn str_field<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(Value::as_str)
}
