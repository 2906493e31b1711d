//! `sessioncast` 可执行入口
//!
//! 加载配置、初始化日志并启动 HTTP 服务器。

use anyhow::Context;
use sessioncast_lib::config::{collapse_tilde, load_effective_config, resolve_config_path};
use sessioncast_lib::serve;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = resolve_config_path();
    let config = load_effective_config()
        .with_context(|| format!("failed to load config from {}", collapse_tilde(&config_path)))?;

    // RUST_LOG 优先，否则使用配置中的日志级别
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .init();

    tracing::info!("[SERVER] 配置文件: {}", collapse_tilde(&config_path));
    serve(config).await
}
