//! 客户端错误响应
//!
//! 统一形态：`{"error": {"message": "...", "type": "..."}}`

use crate::backend::BackendError;
use crate::converter::PromptError;
use crate::streaming::StreamError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// API 错误
#[derive(Debug, Error)]
pub enum ApiError {
    /// 客户端输入不合法，不重试
    #[error("{0}")]
    InvalidRequest(String),

    /// 后端回合失败
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// 读取后端事件流失败
    #[error(transparent)]
    Stream(#[from] StreamError),

    /// 回合任务异常退出
    #[error("turn task ended unexpectedly")]
    TurnAborted,
}

impl From<PromptError> for ApiError {
    fn from(err: PromptError) -> Self {
        ApiError::InvalidRequest(err.to_string())
    }
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::BAD_GATEWAY,
        }
    }

    pub fn error_type(&self) -> &'static str {
        match self {
            ApiError::InvalidRequest(_) => "invalid_request_error",
            _ => "proxy_error",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = json!({
            "error": {
                "message": self.to_string(),
                "type": self.error_type(),
            }
        });
        (status, Json(body)).into_response()
    }
}
