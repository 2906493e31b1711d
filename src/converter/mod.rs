//! 请求转换模块
//!
//! 把客户端的多消息请求压平为后端接受的单条提示词。

pub mod prompt;

pub use prompt::{PromptError, PromptMessage, Role, TurnPrompt};
