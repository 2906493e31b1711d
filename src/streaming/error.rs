//! 流式传输错误类型
//!
//! 定义后端事件流读取与转码过程中可能发生的错误。

use serde::{Deserialize, Serialize};
use std::fmt;

/// 流式传输错误类型
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "details")]
pub enum StreamError {
    /// 网络错误
    ///
    /// 读取后端事件流时连接失败或被重置。
    Network(String),

    /// 超时错误
    ///
    /// 回合总时长或两个 chunk 之间的间隔超过配置值。
    Timeout,
}

impl fmt::Display for StreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamError::Network(msg) => write!(f, "network error: {}", msg),
            StreamError::Timeout => write!(f, "backend stream timed out"),
        }
    }
}

impl std::error::Error for StreamError {}

impl From<reqwest::Error> for StreamError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            StreamError::Timeout
        } else if err.is_connect() {
            StreamError::Network(format!("connect failed: {}", err))
        } else {
            StreamError::Network(err.to_string())
        }
    }
}

impl StreamError {
    /// 创建网络错误
    pub fn network(msg: impl Into<String>) -> Self {
        StreamError::Network(msg.into())
    }

    /// 获取错误类型字符串
    pub fn error_type_string(&self) -> &'static str {
        match self {
            StreamError::Network(_) => "network_error",
            StreamError::Timeout => "timeout",
        }
    }
}
