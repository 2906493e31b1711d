//! 会话后端 HTTP 客户端
//!
//! 后端暴露三个端点：会话探测（判断是否空闲）、提示词提交、事件流。
//! 三者都可能返回忙碌状态。

use crate::backend::error::BackendError;
use crate::config::BackendConfig;
use crate::streaming::traits::{reqwest_stream_to_stream_response, StreamResponse};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

/// 单会话后端
#[async_trait]
pub trait SessionBackend: Send + Sync {
    /// 会话探测，成功表示后端空闲
    async fn probe_session(&self) -> Result<(), BackendError>;

    /// 提交扁平化后的提示词
    async fn submit_message(&self, text: &str) -> Result<(), BackendError>;

    /// 打开事件流
    async fn open_stream(&self) -> Result<StreamResponse, BackendError>;

    /// 后端名称（日志使用）
    fn name(&self) -> &str;
}

/// 基于 reqwest 的后端实现
#[derive(Debug, Clone)]
pub struct HttpSessionBackend {
    config: BackendConfig,
    client: Client,
}

impl HttpSessionBackend {
    pub fn new(config: BackendConfig) -> Self {
        Self::with_client(config, Client::new())
    }

    pub fn with_client(config: BackendConfig, client: Client) -> Self {
        Self { config, client }
    }

    async fn check_status(&self, resp: reqwest::Response) -> Result<reqwest::Response, BackendError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let code = status.as_u16();
        let busy = self.config.is_busy_status(code);
        let body = if busy {
            String::new()
        } else {
            resp.text().await.unwrap_or_default()
        };
        Err(BackendError::from_status(code, &body, busy))
    }
}

#[async_trait]
impl SessionBackend for HttpSessionBackend {
    async fn probe_session(&self) -> Result<(), BackendError> {
        let url = self.config.url(&self.config.probe_path);
        let resp = self
            .client
            .post(&url)
            .timeout(self.config.request_timeout())
            .send()
            .await?;
        self.check_status(resp).await.map(|_| ())
    }

    async fn submit_message(&self, text: &str) -> Result<(), BackendError> {
        let url = self.config.url(&self.config.message_path);
        tracing::debug!("[BACKEND] 提交提示词: url={} chars={}", url, text.chars().count());

        let resp = self
            .client
            .post(&url)
            .timeout(self.config.request_timeout())
            .json(&json!({ "message": text }))
            .send()
            .await?;
        self.check_status(resp).await.map(|_| ())
    }

    async fn open_stream(&self) -> Result<StreamResponse, BackendError> {
        let url = self.config.url(&self.config.stream_path);
        tracing::info!("[BACKEND] 打开事件流: url={}", url);

        // 事件流持续时间由回合超时约束，这里不设置请求超时
        let resp = self
            .client
            .post(&url)
            .header("Accept", "text/event-stream")
            .send()
            .await?;
        let resp = self.check_status(resp).await?;

        tracing::info!("[BACKEND] 事件流已打开: status={}", resp.status());
        Ok(reqwest_stream_to_stream_response(resp))
    }

    fn name(&self) -> &str {
        &self.config.base_url
    }
}
