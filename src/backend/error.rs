//! 后端错误类型
//!
//! 区分可重试（忙碌、传输失败）与终止性错误。

use thiserror::Error;

/// 后端调用错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// 后端正在处理另一个回合
    #[error("backend busy (HTTP {status})")]
    Busy { status: u16 },

    /// 非成功、非忙碌的 HTTP 状态
    #[error("backend returned HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// 连接失败、超时等传输层错误
    #[error("backend transport error: {0}")]
    Transport(String),

    /// 提示词提交在所有尝试中都失败
    #[error("backend unreachable after retries")]
    Unreachable { attempts: u32 },

    /// 所有尝试中后端都处于忙碌状态
    #[error("backend remained busy after all retries")]
    BusyExhausted { attempts: u32 },
}

impl BackendError {
    /// 根据状态码与响应体创建错误
    pub fn from_status(status: u16, body: &str, busy: bool) -> Self {
        if busy {
            BackendError::Busy { status }
        } else {
            BackendError::Http {
                status,
                message: truncate_message(body, 200),
            }
        }
    }

    pub fn is_busy(&self) -> bool {
        matches!(self, BackendError::Busy { .. })
    }

    /// 忙碌与传输错误可以在等待后重试
    pub fn is_retryable(&self) -> bool {
        matches!(self, BackendError::Busy { .. } | BackendError::Transport(_))
    }
}

impl From<reqwest::Error> for BackendError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            BackendError::Transport("request timed out".to_string())
        } else if err.is_connect() {
            BackendError::Transport(format!("connect failed: {}", err))
        } else {
            BackendError::Transport(err.to_string())
        }
    }
}

/// 截断过长的错误消息（按字符计）
fn truncate_message(msg: &str, max_chars: usize) -> String {
    if msg.chars().count() <= max_chars {
        msg.to_string()
    } else {
        let truncated: String = msg.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}
