//! YAML 配置加载
//!
//! 加载顺序：配置文件（不存在时使用默认值）→ 环境变量覆盖 → 校验。

use super::path_utils::expand_tilde;
use super::types::Config;
use std::path::{Path, PathBuf};

/// 配置文件路径环境变量
pub const CONFIG_PATH_ENV: &str = "SESSIONCAST_CONFIG";
/// 监听地址环境变量
pub const HOST_ENV: &str = "SESSIONCAST_HOST";
/// 监听端口环境变量
pub const PORT_ENV: &str = "SESSIONCAST_PORT";
/// 后端地址环境变量
pub const BACKEND_URL_ENV: &str = "SESSIONCAST_BACKEND_URL";

/// 默认配置文件路径
pub const DEFAULT_CONFIG_PATH: &str = "~/.sessioncast/config.yaml";

/// 配置错误
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("读取配置文件失败 {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("解析 YAML 配置失败: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("配置无效: {0}")]
    Invalid(String),
}

/// 解析配置文件路径
///
/// `SESSIONCAST_CONFIG` 优先，否则使用默认路径；两者都会展开 `~`。
pub fn resolve_config_path() -> PathBuf {
    let raw = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    expand_tilde(raw)
}

/// 从文件加载配置
///
/// 文件不存在时返回默认配置；存在但无法解析时返回错误。
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        tracing::info!("[CONFIG] 配置文件不存在，使用默认配置: {:?}", path);
        return Ok(Config::default());
    }

    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(&content)
}

/// 从 YAML 字符串解析配置
pub fn parse_config(content: &str) -> Result<Config, ConfigError> {
    if content.trim().is_empty() {
        return Ok(Config::default());
    }
    let config: Config = serde_yaml::from_str(content)?;
    Ok(config)
}

/// 加载完整配置：文件 → 环境变量覆盖 → 校验
pub fn load_effective_config() -> Result<Config, ConfigError> {
    let path = resolve_config_path();
    let mut config = load_config(&path)?;
    apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
    config.validate()?;
    Ok(config)
}

/// 应用环境变量覆盖
///
/// `lookup` 便于测试时注入变量来源。
pub fn apply_env_overrides<F>(config: &mut Config, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(host) = lookup(HOST_ENV) {
        config.server.host = host;
    }
    if let Some(port) = lookup(PORT_ENV) {
        config.server.port = port
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid(format!("{} 不是有效端口: {}", PORT_ENV, port)))?;
    }
    if let Some(url) = lookup(BACKEND_URL_ENV) {
        config.backend.base_url = url;
    }
    Ok(())
}

impl Config {
    /// 校验配置
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Invalid("server.port 不能为 0".to_string()));
        }
        if self.backend.base_url.trim().is_empty() {
            return Err(ConfigError::Invalid("backend.base_url 不能为空".to_string()));
        }
        if self.retry.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "retry.poll_interval_ms 必须大于 0".to_string(),
            ));
        }
        if self.streaming.max_line_bytes == 0 {
            return Err(ConfigError::Invalid(
                "streaming.max_line_bytes 必须大于 0".to_string(),
            ));
        }
        Ok(())
    }
}
