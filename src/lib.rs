//! SessionCast 核心库
//!
//! 将 OpenAI 风格的 Chat Completions / Responses 请求翻译为单会话 Agent 后端
//! 的 "提交消息 → 读取 SSE 事件流" 协议，并把后端事件流实时转换回客户端格式。
//!
//! # 模块
//!
//! - `config`: YAML 配置与环境变量覆盖
//! - `models`: 客户端请求/响应数据模型
//! - `converter`: 客户端消息到后端提示词的转换
//! - `backend`: 后端 HTTP 客户端与回合驱动器（忙碌重试）
//! - `queue`: 请求串行化队列
//! - `streaming`: SSE 行重组、事件分类与两种流式转码器
//! - `processor`: 请求上下文
//! - `server`: axum 路由与处理器

pub mod backend;
pub mod config;
pub mod converter;
pub mod models;
pub mod processor;
pub mod queue;
pub mod server;
pub mod streaming;

pub use config::Config;
pub use server::{build_router, serve, AppState};
