//! 客户端消息 → 扁平化提示词
//!
//! 后端只接受单条文本消息，所以每条客户端消息渲染为
//! 角色头加正文，消息之间以空行分隔：
//!
//! ```text
//! [System]
//! be brief
//!
//! [User]
//! hi
//! ```

use crate::models::openai::{ChatMessage, MessageContent};
use crate::models::responses::{ResponsesInput, ResponsesRequest};
use thiserror::Error;

/// 提示词构建错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PromptError {
    #[error("messages must not be empty")]
    NoMessages,
    #[error("no text content found in messages")]
    NoText,
}

/// 消息角色
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    /// 解析角色名，`developer` 视为 system，未知角色视为 user
    pub fn parse(role: &str) -> Self {
        match role.to_ascii_lowercase().as_str() {
            "system" | "developer" => Role::System,
            "assistant" => Role::Assistant,
            _ => Role::User,
        }
    }

    pub fn header(&self) -> &'static str {
        match self {
            Role::System => "[System]",
            Role::User => "[User]",
            Role::Assistant => "[Assistant]",
        }
    }
}

/// 单条带角色的文本
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptMessage {
    pub role: Role,
    pub text: String,
}

/// 一个回合的扁平化提示词
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnPrompt {
    messages: Vec<PromptMessage>,
}

impl TurnPrompt {
    /// 从 Chat Completions 消息构建
    pub fn from_chat(messages: &[ChatMessage]) -> Result<Self, PromptError> {
        if messages.is_empty() {
            return Err(PromptError::NoMessages);
        }
        Self::collect(
            messages
                .iter()
                .map(|m| (Role::parse(&m.role), m.content.as_ref())),
        )
    }

    /// 从 Responses 请求构建，`instructions` 作为开头的 system 消息
    pub fn from_responses(request: &ResponsesRequest) -> Result<Self, PromptError> {
        let mut entries: Vec<(Role, Option<MessageContent>)> = Vec::new();
        if let Some(instructions) = &request.instructions {
            entries.push((Role::System, Some(MessageContent::Text(instructions.clone()))));
        }

        match &request.input {
            ResponsesInput::Text(text) => {
                entries.push((Role::User, Some(MessageContent::Text(text.clone()))));
            }
            ResponsesInput::Items(items) => {
                for item in items {
                    // 没有 role 的输入项（工具调用输出等）不进入提示词
                    if let Some(role) = &item.role {
                        entries.push((Role::parse(role), item.content.clone()));
                    }
                }
            }
        }

        if entries.is_empty() {
            return Err(PromptError::NoMessages);
        }
        Self::collect(entries.iter().map(|(role, content)| (*role, content.as_ref())))
    }

    fn collect<'a>(
        entries: impl Iterator<Item = (Role, Option<&'a MessageContent>)>,
    ) -> Result<Self, PromptError> {
        let messages: Vec<PromptMessage> = entries
            .filter_map(|(role, content)| {
                let text = content?.text();
                if text.trim().is_empty() {
                    None
                } else {
                    Some(PromptMessage { role, text })
                }
            })
            .collect();

        if messages.is_empty() {
            return Err(PromptError::NoText);
        }
        Ok(Self { messages })
    }

    pub fn messages(&self) -> &[PromptMessage] {
        &self.messages
    }

    /// 渲染为后端接受的单条文本
    pub fn render(&self) -> String {
        self.messages
            .iter()
            .map(|m| format!("{}\n{}", m.role.header(), m.text))
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}
