//! OpenAI Responses API 请求模型
//!
//! 响应对象与生命周期事件由 `streaming::responses` 直接以 JSON 构建。

use super::openai::MessageContent;
use serde::{Deserialize, Serialize};

/// Responses 请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponsesRequest {
    #[serde(default)]
    pub model: String,
    pub input: ResponsesInput,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    #[serde(default)]
    pub stream: bool,
}

/// 输入：单个字符串或输入项列表
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResponsesInput {
    Text(String),
    Items(Vec<ResponsesInputItem>),
}

/// 输入项
///
/// 只有带 `role` 的消息项会进入提示词，工具调用输出等其他项被忽略。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponsesInputItem {
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub item_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<MessageContent>,
}
