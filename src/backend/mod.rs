//! 会话后端
//!
//! - `client`: 后端 HTTP 端点封装
//! - `driver`: 提交 → 打开事件流的重试状态机
//! - `error`: 后端错误类型

pub mod client;
pub mod driver;
pub mod error;

pub use client::{HttpSessionBackend, SessionBackend};
pub use driver::{TurnDriver, TurnHandle, TurnState};
pub use error::BackendError;
