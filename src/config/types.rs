//! 配置类型定义
//!
//! 所有字段都带有 serde 默认值，缺省的 YAML 段落会回退到内置默认配置。

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 主配置结构
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// 本地服务器配置
    #[serde(default)]
    pub server: ServerConfig,
    /// 后端 Agent 服务配置
    #[serde(default)]
    pub backend: BackendConfig,
    /// 忙碌重试配置
    #[serde(default)]
    pub retry: RetrySettings,
    /// 流式传输配置
    #[serde(default)]
    pub streaming: StreamingSettings,
    /// 日志配置
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// 本地服务器配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    /// 监听地址
    #[serde(default = "default_host")]
    pub host: String,
    /// 监听端口
    #[serde(default = "default_port")]
    pub port: u16,
    /// 请求体大小上限（字节）
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8990
}

fn default_body_limit() -> usize {
    10 * 1024 * 1024 // 10MB
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            body_limit_bytes: default_body_limit(),
        }
    }
}

impl ServerConfig {
    /// 获取监听地址字符串
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// 后端 Agent 服务配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BackendConfig {
    /// 后端基础 URL
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// 会话探测路径（用于判断后端是否空闲）
    #[serde(default = "default_probe_path")]
    pub probe_path: String,
    /// 提交消息路径
    #[serde(default = "default_message_path")]
    pub message_path: String,
    /// 事件流路径
    #[serde(default = "default_stream_path")]
    pub stream_path: String,
    /// 表示"后端忙碌"的 HTTP 状态码
    #[serde(default = "default_busy_statuses")]
    pub busy_statuses: Vec<u16>,
    /// 单次后端请求超时（秒），不作用于事件流读取
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// 对客户端公布的模型名称
    #[serde(default = "default_model")]
    pub model: String,
}

fn default_base_url() -> String {
    "http://127.0.0.1:8000".to_string()
}

fn default_probe_path() -> String {
    "/session".to_string()
}

fn default_message_path() -> String {
    "/message".to_string()
}

fn default_stream_path() -> String {
    "/stream".to_string()
}

fn default_busy_statuses() -> Vec<u16> {
    vec![409]
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_model() -> String {
    "session-agent".to_string()
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            probe_path: default_probe_path(),
            message_path: default_message_path(),
            stream_path: default_stream_path(),
            busy_statuses: default_busy_statuses(),
            request_timeout_secs: default_request_timeout_secs(),
            model: default_model(),
        }
    }
}

impl BackendConfig {
    /// 拼接后端 URL，容忍 base_url 末尾的 `/` 与 path 开头缺少的 `/`
    pub fn url(&self, path: &str) -> String {
        let base = self.base_url.trim_end_matches('/');
        if path.starts_with('/') {
            format!("{}{}", base, path)
        } else {
            format!("{}/{}", base, path)
        }
    }

    /// 判断状态码是否表示后端忙碌
    pub fn is_busy_status(&self, status: u16) -> bool {
        self.busy_statuses.contains(&status)
    }

    /// 获取请求超时 Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// 忙碌重试配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrySettings {
    /// 完整回合（提交 + 打开流）的最大重试次数
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// 每次重试前等待后端空闲的最长时间（毫秒）
    #[serde(default = "default_idle_wait_ms")]
    pub idle_wait_ms: u64,
    /// 空闲探测的轮询间隔（毫秒）
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_max_retries() -> u32 {
    4
}

fn default_idle_wait_ms() -> u64 {
    30_000 // 30 秒
}

fn default_poll_interval_ms() -> u64 {
    1_500
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            idle_wait_ms: default_idle_wait_ms(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl RetrySettings {
    pub fn idle_wait(&self) -> Duration {
        Duration::from_millis(self.idle_wait_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// 流式传输配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StreamingSettings {
    /// 单个回合的最长持续时间（毫秒）
    #[serde(default = "default_turn_timeout_ms")]
    pub timeout_ms: u64,
    /// 两个后端 chunk 之间的最大等待时间（毫秒）
    #[serde(default = "default_chunk_timeout_ms")]
    pub chunk_timeout_ms: u64,
    /// 回合结束信号之后继续读取后端残留数据的最长等待（毫秒）
    #[serde(default = "default_drain_grace_ms")]
    pub drain_grace_ms: u64,
    /// 未完成行的最大缓冲字节数
    #[serde(default = "default_max_line_bytes")]
    pub max_line_bytes: usize,
    /// 没有任何文本的回合是否仍发送完整的 Responses 生命周期事件
    #[serde(default)]
    pub emit_empty_lifecycle: bool,
}

fn default_turn_timeout_ms() -> u64 {
    300_000 // 5 分钟
}

fn default_chunk_timeout_ms() -> u64 {
    120_000 // 2 分钟
}

fn default_drain_grace_ms() -> u64 {
    2_000
}

fn default_max_line_bytes() -> usize {
    1024 * 1024 // 1MB
}

impl Default for StreamingSettings {
    fn default() -> Self {
        Self {
            timeout_ms: default_turn_timeout_ms(),
            chunk_timeout_ms: default_chunk_timeout_ms(),
            drain_grace_ms: default_drain_grace_ms(),
            max_line_bytes: default_max_line_bytes(),
            emit_empty_lifecycle: false,
        }
    }
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// 默认日志级别（RUST_LOG 优先）
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}
