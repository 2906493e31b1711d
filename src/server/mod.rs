//! HTTP 服务器模块
//!
//! 端点：
//! - `POST /v1/chat/completions`
//! - `POST /v1/responses`
//! - `GET /v1/models`
//! - `GET /health`

pub mod error;
mod handlers;

pub use error::ApiError;

use crate::backend::{HttpSessionBackend, SessionBackend, TurnDriver};
use crate::config::Config;
use crate::queue::TurnQueue;
use anyhow::Context;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;

/// 共享状态
///
/// 队列是唯一跨请求共享的可变状态。
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub queue: TurnQueue,
    pub driver: TurnDriver,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let backend = HttpSessionBackend::new(config.backend.clone());
        Self::with_backend(config, Arc::new(backend))
    }

    /// 使用自定义后端创建（测试中注入）
    pub fn with_backend(config: Config, backend: Arc<dyn SessionBackend>) -> Self {
        let driver = TurnDriver::new(backend, config.retry.clone());
        Self {
            config: Arc::new(config),
            queue: TurnQueue::new(),
            driver,
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    let body_limit = state.config.server.body_limit_bytes;

    Router::new()
        .route("/health", get(handlers::health))
        .route("/v1/models", get(handlers::models))
        .route("/v1/chat/completions", post(handlers::chat_completions))
        .route("/v1/responses", post(handlers::responses))
        .layer(
            ServiceBuilder::new()
                .layer(DefaultBodyLimit::disable())
                .layer(RequestBodyLimitLayer::new(body_limit))
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

/// 启动服务器，Ctrl-C 时优雅退出
pub async fn serve(config: Config) -> anyhow::Result<()> {
    let addr = config.server.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    tracing::info!(
        "[SERVER] 监听 {} → 后端 {} (max_retries={} idle_wait_ms={})",
        addr,
        config.backend.base_url,
        config.retry.max_retries,
        config.retry.idle_wait_ms
    );

    let app = build_router(AppState::new(config));
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("[SERVER] 已停止");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("[SERVER] 无法监听 Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("[SERVER] 收到退出信号，等待进行中的请求结束");
}
